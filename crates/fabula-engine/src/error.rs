use fabula_checkpoint::StoreError;
use fabula_llm::GatewayError;
use fabula_utils::error::{ErrorCategory, UserFriendlyError};
use fabula_utils::types::{JobIdError, PhaseId};

/// Errors that stop a job before or between phases.
///
/// Gateway failures inside a phase are not `EngineError`s: they mark the
/// phase `failed` and are reported through [`JobResult`](crate::JobResult).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The checkpoint violates the phase dependency graph.
    #[error("Dependency violation in job '{job_id}' at {phase}: {reason}")]
    DependencyViolation {
        job_id: String,
        phase: PhaseId,
        reason: String,
    },

    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' is locked: {reason}")]
    JobLocked { job_id: String, reason: String },

    #[error("Unknown profile set '{profile}'")]
    UnknownProfile { profile: String },

    #[error("Engine configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    InvalidJobId(#[from] JobIdError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::JobLocked { job_id, reason } => Self::JobLocked { job_id, reason },
            StoreError::JobNotFound { job_id } => Self::JobNotFound { job_id },
            other => Self::Store(other),
        }
    }
}

impl UserFriendlyError for EngineError {
    fn user_message(&self) -> String {
        match self {
            Self::DependencyViolation { job_id, phase, .. } => {
                format!("Job '{job_id}' has an inconsistent checkpoint at phase {phase}")
            }
            Self::JobNotFound { job_id } => format!("No job named '{job_id}' exists"),
            Self::JobLocked { job_id, .. } => {
                format!("Job '{job_id}' is being advanced by another process")
            }
            Self::UnknownProfile { profile } => format!("Profile set '{profile}' is not defined"),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::InvalidJobId(e) => format!("Invalid job id: {e}"),
            Self::Store(e) => e.user_message(),
            Self::Gateway(e) => e.user_message(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::DependencyViolation { reason, .. } => Some(format!(
                "{reason}. A phase may only be completed after all of its dependencies; the checkpoint is never repaired automatically."
            )),
            Self::JobLocked { reason, .. } => Some(reason.clone()),
            Self::Store(e) => e.context(),
            Self::Gateway(e) => e.context(),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::DependencyViolation { job_id, .. } => vec![
                format!("Inspect the phase files under <home>/jobs/{job_id}/phases/"),
                "Start a fresh job with a new id if the checkpoint cannot be trusted".to_string(),
            ],
            Self::JobNotFound { .. } => {
                vec!["Start the job with 'fabula run <JOB_ID> --source <PATH>'".to_string()]
            }
            Self::JobLocked { .. } => vec![
                "Wait for the other run to finish, then resume".to_string(),
                "If no other run is active, the stale lock is reclaimed automatically".to_string(),
            ],
            Self::UnknownProfile { .. } => {
                vec!["List available profile sets with 'fabula profiles'".to_string()]
            }
            Self::Config(_) => {
                vec!["Check .fabula/config.toml and command-line flags".to_string()]
            }
            Self::InvalidJobId(_) => vec!["Job ids may contain only [A-Za-z0-9._-]".to_string()],
            Self::Store(e) => e.suggestions(),
            Self::Gateway(e) => e.suggestions(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::DependencyViolation { .. } | Self::InvalidJobId(_) => ErrorCategory::Validation,
            Self::JobNotFound { .. } => ErrorCategory::Storage,
            Self::JobLocked { .. } => ErrorCategory::Concurrency,
            Self::UnknownProfile { .. } | Self::Config(_) => ErrorCategory::Configuration,
            Self::Store(e) => e.category(),
            Self::Gateway(e) => e.category(),
        }
    }
}
