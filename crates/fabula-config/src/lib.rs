//! Configuration management for fabula
//!
//! Hierarchical configuration with discovery and precedence: CLI > file >
//! defaults. The TOML file lives at `.fabula/config.toml` and is found by
//! searching upward from the working directory.

mod discovery;
mod model;
mod profiles;
mod validation;

pub use discovery::{CliArgs, TomlConfig};
pub use model::{
    Config, ConfigSource, Defaults, GatewayConfig, ImageBackendConfig, ImagesConfig,
    MemoryConfig, ModelPrice, PipelineConfig, ProviderConfig, TelemetryConfig, TelemetrySinkKind,
};
pub use profiles::{
    CompletionMode, DEFAULT_PROFILE, ImageProfile, ModelProfile, ProfileSet, Provider,
    ReasoningEffort, builtin_profiles,
};
