//! Error type for the `fabula` CLI and library surface.
//!
//! Each crate keeps its own `thiserror` enum. [`FabulaError`] wraps them so
//! the CLI has one place that maps failures to exit codes and renders them
//! for users.

use fabula_engine::{EngineError, JobResult};
use fabula_llm::GatewayError;
use fabula_memory::MemoryError;
use fabula_utils::error::{ConfigError, ErrorCategory, UserFriendlyError};
use fabula_utils::exit_codes::ExitCode;
use fabula_utils::types::{JobIdError, PhaseId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabulaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Reasoning memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Invalid job id: {0}")]
    InvalidJobId(#[from] JobIdError),

    /// The run finished but the job halted at a failed phase.
    #[error("Job '{job_id}' failed at phase {phase}: {message}")]
    JobFailed {
        job_id: String,
        phase: PhaseId,
        message: String,
        gateway: Option<GatewayError>,
    },

    #[error("Failed to read source text from {path}: {source}")]
    SourceRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Exit code for a gateway failure.
#[must_use]
pub fn gateway_exit_code(err: &GatewayError) -> ExitCode {
    match err {
        GatewayError::Timeout { .. } => ExitCode::PHASE_TIMEOUT,
        GatewayError::ProviderAuth(_)
        | GatewayError::ProviderQuota(_)
        | GatewayError::ProviderOutage(_)
        | GatewayError::ImageChainExhausted { .. } => ExitCode::PROVIDER_FAILURE,
        GatewayError::Misconfiguration(_) | GatewayError::Unsupported(_) => ExitCode::CLI_ARGS,
        GatewayError::Transport(_) | GatewayError::NoImageData { .. } => ExitCode::JOB_FAILED,
    }
}

impl FabulaError {
    /// `Some` when the run left the job failed at a phase.
    #[must_use]
    pub fn from_job_result(result: &JobResult) -> Option<Self> {
        let failure = result.failure.as_ref()?;
        Some(Self::JobFailed {
            job_id: result.job_id.to_string(),
            phase: failure.phase,
            message: failure.message.clone(),
            gateway: failure.gateway.clone(),
        })
    }

    /// Map to the documented CLI exit code.
    ///
    /// # Example
    ///
    /// ```rust
    /// use fabula::error::FabulaError;
    /// use fabula_utils::error::ConfigError;
    /// use fabula_utils::exit_codes::ExitCode;
    ///
    /// let err = FabulaError::Config(ConfigError::UnknownProfile { name: "x".into() });
    /// assert_eq!(err.to_exit_code(), ExitCode::CLI_ARGS);
    /// ```
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::InvalidJobId(_) | Self::SourceRead { .. } => ExitCode::CLI_ARGS,

            Self::Engine(engine) => match engine {
                EngineError::DependencyViolation { .. } => ExitCode::DEPENDENCY_VIOLATION,
                EngineError::JobLocked { .. } => ExitCode::LOCK_HELD,
                EngineError::JobNotFound { .. }
                | EngineError::UnknownProfile { .. }
                | EngineError::Config(_)
                | EngineError::InvalidJobId(_) => ExitCode::CLI_ARGS,
                EngineError::Gateway(gateway) => gateway_exit_code(gateway),
                EngineError::Store(_) => ExitCode::INTERNAL,
            },

            Self::JobFailed { gateway, .. } => {
                gateway.as_ref().map_or(ExitCode::JOB_FAILED, gateway_exit_code)
            }

            Self::Memory(_) | Self::Other(_) => ExitCode::INTERNAL,
        }
    }
}

impl UserFriendlyError for FabulaError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Engine(e) => e.user_message(),
            Self::Memory(e) => e.user_message(),
            Self::InvalidJobId(e) => format!("Invalid job id: {e}"),
            Self::JobFailed {
                job_id,
                phase,
                message,
                ..
            } => format!(
                "Job '{job_id}' failed at phase {} ({phase}): {message}",
                phase.ordinal()
            ),
            Self::SourceRead { path, .. } => format!("Could not read source text from {path}"),
            Self::Other(e) => e.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Engine(e) => e.context(),
            Self::Memory(e) => e.context(),
            Self::JobFailed { gateway, .. } => gateway.as_ref().and_then(UserFriendlyError::context),
            Self::SourceRead { source, .. } => Some(source.to_string()),
            Self::InvalidJobId(_) | Self::Other(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Engine(e) => e.suggestions(),
            Self::Memory(e) => e.suggestions(),
            Self::InvalidJobId(_) => {
                vec!["Use only letters, digits, '.', '_' and '-' in job ids".to_string()]
            }
            Self::JobFailed { job_id, gateway, .. } => {
                let mut suggestions = gateway
                    .as_ref()
                    .map(UserFriendlyError::suggestions)
                    .unwrap_or_default();
                suggestions.push(format!(
                    "Run 'fabula resume {job_id}' to retry from the failed phase"
                ));
                suggestions
            }
            Self::SourceRead { .. } => {
                vec!["Pass a readable file with --source, or '-' to read stdin".to_string()]
            }
            Self::Other(_) => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Engine(e) => e.category(),
            Self::Memory(_) => ErrorCategory::Storage,
            Self::InvalidJobId(_) | Self::SourceRead { .. } => ErrorCategory::Validation,
            Self::JobFailed { gateway, .. } => {
                if gateway.is_some() {
                    ErrorCategory::ModelProvider
                } else {
                    ErrorCategory::PhaseExecution
                }
            }
            Self::Other(_) => ErrorCategory::PhaseExecution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_engine_exit_codes() {
        let cases = [
            (
                EngineError::DependencyViolation {
                    job_id: "a".into(),
                    phase: PhaseId::NarrativeStructure,
                    reason: "x".into(),
                },
                ExitCode::DEPENDENCY_VIOLATION,
            ),
            (
                EngineError::JobLocked {
                    job_id: "a".into(),
                    reason: "held".into(),
                },
                ExitCode::LOCK_HELD,
            ),
            (
                EngineError::JobNotFound { job_id: "a".into() },
                ExitCode::CLI_ARGS,
            ),
            (
                EngineError::Gateway(GatewayError::Misconfiguration("no key".into())),
                ExitCode::CLI_ARGS,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(FabulaError::from(err).to_exit_code(), code);
        }
    }

    #[test]
    fn test_job_failed_exit_code_follows_gateway_error() {
        let failed = |gateway| FabulaError::JobFailed {
            job_id: "a".into(),
            phase: PhaseId::CharacterProfiles,
            message: "boom".into(),
            gateway,
        };
        assert_eq!(
            failed(Some(GatewayError::Timeout {
                duration: Duration::from_secs(5)
            }))
            .to_exit_code(),
            ExitCode::PHASE_TIMEOUT
        );
        assert_eq!(
            failed(Some(GatewayError::ProviderQuota("429".into()))).to_exit_code(),
            ExitCode::PROVIDER_FAILURE
        );
        assert_eq!(
            failed(Some(GatewayError::Transport("reset".into()))).to_exit_code(),
            ExitCode::JOB_FAILED
        );
        assert_eq!(failed(None).to_exit_code(), ExitCode::JOB_FAILED);
    }

    #[test]
    fn test_job_failed_suggests_resume() {
        let err = FabulaError::JobFailed {
            job_id: "alpha".into(),
            phase: PhaseId::NarrativeStructure,
            message: "outage".into(),
            gateway: None,
        };
        assert!(err.user_message().contains("phase 3"));
        assert!(err.suggestions().iter().any(|s| s.contains("fabula resume alpha")));
    }
}
