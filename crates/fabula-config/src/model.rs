use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use fabula_utils::paths::FabulaHome;

use crate::profiles::{DEFAULT_PROFILE, ProfileSet, builtin_profiles};

/// Where a configuration value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Cli,
    ConfigFile(PathBuf),
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::ConfigFile(path) => write!(f, "config ({})", path.display()),
            Self::Defaults => write!(f, "default"),
        }
    }
}

/// Effective configuration for a fabula run.
///
/// Built by [`Config::discover`](crate::Config::discover) with precedence
/// CLI > file > defaults, or directly via [`Config::default`] for embedding
/// and tests.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// profile = "baseline"
/// call_timeout_secs = 120
/// max_attempts = 3
///
/// [gateway.anthropic]
/// api_key_env = "ANTHROPIC_API_KEY"
///
/// [images.secondary]
/// name = "together"
/// base_url = "https://api.together.xyz/v1"
/// api_key_env = "TOGETHER_API_KEY"
/// model = "black-forest-labs/FLUX.1-schnell"
///
/// [pipeline]
/// cover_art = true
///
/// [memory]
/// retrieve_limit = 2
///
/// [profiles.baseline.production_plan]
/// model_id = "claude-sonnet-4-5"
/// provider = "anthropic"
/// mode = "plain"
/// max_output_tokens = 4096
///
/// [pricing."claude-sonnet-4-5"]
/// input_per_mtok = 3.0
/// output_per_mtok = 15.0
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub gateway: GatewayConfig,
    pub images: ImagesConfig,
    pub pipeline: PipelineConfig,
    pub memory: MemoryConfig,
    pub telemetry: TelemetryConfig,
    /// Named profile sets (built-ins merged with file overrides).
    pub profiles: BTreeMap<String, ProfileSet>,
    /// Per-model price overrides, merged over the gateway's built-in table.
    pub pricing: BTreeMap<String, ModelPrice>,
    /// Source attribution for scalar settings (for status display).
    pub source_attribution: HashMap<String, ConfigSource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: Defaults::default(),
            gateway: GatewayConfig::default(),
            images: ImagesConfig::default(),
            pipeline: PipelineConfig::default(),
            memory: MemoryConfig::default(),
            telemetry: TelemetryConfig::default(),
            profiles: builtin_profiles(),
            pricing: BTreeMap::new(),
            source_attribution: HashMap::new(),
        }
    }
}

impl Config {
    /// Profile set by name.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&ProfileSet> {
        self.profiles.get(name)
    }

    /// Home directory: `--home` (already folded into `defaults.home` with
    /// [`ConfigSource::Cli`]) > `FABULA_HOME` > config file > `.fabula`.
    #[must_use]
    pub fn home(&self) -> FabulaHome {
        let from_cli = matches!(self.source_attribution.get("home"), Some(ConfigSource::Cli));
        match (&self.defaults.home, from_cli) {
            (Some(home), true) => FabulaHome::new(home.clone()),
            (file_home, _) => FabulaHome::resolve_from_env(None, file_home.as_deref()),
        }
    }
}

/// `[defaults]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Defaults {
    /// Profile set used for new jobs that do not name one.
    pub profile: String,
    /// Upper bound on a single gateway call.
    pub call_timeout_secs: u64,
    /// Gateway attempts for transient failures (1 = no retry).
    pub max_attempts: u32,
    /// State directory (jobs, memory, telemetry).
    pub home: Option<Utf8PathBuf>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            profile: DEFAULT_PROFILE.to_string(),
            call_timeout_secs: 180,
            max_attempts: 3,
            home: None,
        }
    }
}

/// HTTP endpoint and credential source for a text provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub api_key_env: String,
    pub base_url: String,
}

/// `[gateway.anthropic]` and `[gateway.openrouter]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub anthropic: ProviderConfig,
    pub openrouter: ProviderConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            anthropic: ProviderConfig {
                api_key_env: "ANTHROPIC_API_KEY".to_string(),
                base_url: "https://api.anthropic.com/v1/messages".to_string(),
            },
            openrouter: ProviderConfig {
                api_key_env: "OPENROUTER_API_KEY".to_string(),
                base_url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            },
        }
    }
}

/// One OpenAI-compatible image generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBackendConfig {
    /// Label recorded in results as the serving backend.
    pub name: String,
    /// API root; `/images/generations` is appended.
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
}

/// `[images.primary]` and `[images.secondary]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagesConfig {
    pub primary: ImageBackendConfig,
    /// `None` disables the fallback.
    pub secondary: Option<ImageBackendConfig>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            primary: ImageBackendConfig {
                name: "openai".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                model: "gpt-image-1".to_string(),
            },
            secondary: Some(ImageBackendConfig {
                name: "together".to_string(),
                base_url: "https://api.together.xyz/v1".to_string(),
                api_key_env: "TOGETHER_API_KEY".to_string(),
                model: "black-forest-labs/FLUX.1-schnell".to_string(),
            }),
        }
    }
}

/// `[pipeline]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Include the `cover_art` phase in newly created jobs.
    pub cover_art: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { cover_art: true }
    }
}

/// `[memory]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Traces injected into each phase prompt.
    pub retrieve_limit: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retrieve_limit: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelemetrySinkKind {
    /// Events become tracing events.
    #[default]
    Tracing,
    /// Events are appended to `<home>/telemetry/events.jsonl`.
    Jsonl,
    Off,
}

/// `[telemetry]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub sink: TelemetrySinkKind,
    /// Bounded queue size for the JSONL sink; events beyond it are dropped.
    pub channel_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: TelemetrySinkKind::Tracing,
            channel_capacity: 256,
        }
    }
}

/// `[pricing."<model>"]`, USD.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelPrice {
    #[serde(default)]
    pub input_per_mtok: f64,
    #[serde(default)]
    pub output_per_mtok: f64,
    #[serde(default)]
    pub per_image: f64,
}
