//! Shared error reporting vocabulary.
//!
//! Each crate defines its own `thiserror` enum; this module provides the
//! [`UserFriendlyError`] trait they all implement, the [`ErrorCategory`]
//! grouping used by the CLI, and the configuration error type shared by the
//! config loader and the engine.

use std::fmt;
use thiserror::Error;

use crate::redaction::redact_secrets;

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    PhaseExecution,
    ModelProvider,
    Storage,
    Concurrency,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::PhaseExecution => write!(f, "Phase Execution"),
            Self::ModelProvider => write!(f, "Model Provider"),
            Self::Storage => write!(f, "Storage"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

/// Render an error for a terminal: message, context and bulleted suggestions.
///
/// The output passes through [`redact_secrets`] before it is returned.
#[must_use]
pub fn display_for_user<E: UserFriendlyError + ?Sized>(err: &E) -> String {
    let mut output = format!("Error: {}\n", err.user_message());

    if let Some(ctx) = err.context() {
        output.push_str(&format!("\nContext: {ctx}\n"));
    }

    let suggestions = err.suggestions();
    if !suggestions.is_empty() {
        output.push_str("\nSuggestions:\n");
        for suggestion in suggestions {
            output.push_str(&format!("  • {suggestion}\n"));
        }
    }

    redact_secrets(&output)
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {}", errors.join("; "))]
    ValidationFailed { errors: Vec<String> },

    #[error("Unknown model profile '{name}'")]
    UnknownProfile { name: String },

    #[error("Missing credentials: environment variable {env_var} is not set")]
    MissingCredentials { env_var: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Failed to discover configuration: {reason}")
            }
            Self::ValidationFailed { errors } => format!(
                "Configuration validation failed with {} errors: {}",
                errors.len(),
                errors.join(", ")
            ),
            Self::UnknownProfile { name } => format!("Model profile '{name}' is not defined"),
            Self::MissingCredentials { env_var } => {
                format!("API key environment variable '{env_var}' is not set")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) | Self::ValidationFailed { .. } => Some(
                "Configuration files are TOML with [defaults], [gateway], [images], [pipeline], [memory] and [profiles] sections."
                    .to_string(),
            ),
            Self::InvalidValue { key, .. } => Some(format!(
                "The '{key}' configuration option has specific format requirements."
            )),
            Self::NotFound { .. } | Self::DiscoveryFailed { .. } => Some(
                "fabula searches for .fabula/config.toml starting from the current directory upward."
                    .to_string(),
            ),
            Self::UnknownProfile { .. } => Some(
                "Profiles are named sets of per-phase model settings. Built-ins are baseline, fast and deep."
                    .to_string(),
            ),
            Self::MissingCredentials { .. } => Some(
                "Provider API keys are read from the environment variable named by api_key_env."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) | Self::ValidationFailed { .. } => vec![
                "Check the TOML syntax using a TOML validator".to_string(),
                "Run 'fabula profiles' to see the effective profile sets".to_string(),
            ],
            Self::InvalidValue { .. } => vec![
                "Check the documentation for valid values for this option".to_string(),
                "Remove the option to use the default value".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Create .fabula/config.toml in your project root".to_string(),
                "Use --config <path> to point at an explicit file".to_string(),
            ],
            Self::DiscoveryFailed { .. } => vec![
                "Check read permissions on the current and parent directories".to_string(),
                "Use --config <path> to specify configuration file explicitly".to_string(),
            ],
            Self::UnknownProfile { .. } => vec![
                "Run 'fabula profiles' to list available profiles".to_string(),
                "Define the profile under [profiles.<name>] in .fabula/config.toml".to_string(),
            ],
            Self::MissingCredentials { env_var } => vec![
                format!("Export {env_var} in your shell before running fabula"),
                "Or change api_key_env in the [gateway] section".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}
