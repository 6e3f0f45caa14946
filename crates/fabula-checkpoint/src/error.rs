use camino::Utf8PathBuf;
use fabula_utils::error::{ErrorCategory, UserFriendlyError};
use fabula_utils::types::{PhaseId, PhaseStatus};

fn status_label(status: Option<PhaseStatus>) -> &'static str {
    status.map_or("absent", |s| s.as_str())
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Job '{job_id}' not found")]
    JobNotFound { job_id: String },

    #[error("Job '{job_id}' already exists")]
    JobExists { job_id: String },

    /// Conditional write lost: the stored status is not the one the writer read.
    #[error(
        "Conflicting write to {job_id}/{phase}: expected {}, found {}",
        status_label(*expected),
        status_label(*found)
    )]
    Conflict {
        job_id: String,
        phase: PhaseId,
        expected: Option<PhaseStatus>,
        found: Option<PhaseStatus>,
    },

    #[error("Phase {job_id}/{phase} is completed and cannot be modified")]
    PhaseImmutable { job_id: String, phase: PhaseId },

    #[error("Phase {phase} is not enabled for job '{job_id}'")]
    PhaseNotEnabled { job_id: String, phase: PhaseId },

    #[error("Job '{job_id}' is locked: {reason}")]
    JobLocked { job_id: String, reason: String },

    #[error("Checkpoint I/O error at {path}: {reason}")]
    Io { path: Utf8PathBuf, reason: String },

    #[error("Corrupted checkpoint file {path}: {reason}")]
    Corrupted { path: Utf8PathBuf, reason: String },
}

impl UserFriendlyError for StoreError {
    fn user_message(&self) -> String {
        match self {
            Self::JobNotFound { job_id } => format!("No job named '{job_id}' exists"),
            Self::JobExists { job_id } => format!("A job named '{job_id}' already exists"),
            Self::Conflict { job_id, phase, .. } => {
                format!("Another writer changed phase {phase} of job '{job_id}'")
            }
            Self::PhaseImmutable { job_id, phase } => {
                format!("Phase {phase} of job '{job_id}' is already completed")
            }
            Self::PhaseNotEnabled { job_id, phase } => {
                format!("Phase {phase} is not part of job '{job_id}'")
            }
            Self::JobLocked { job_id, .. } => {
                format!("Job '{job_id}' is being advanced by another process")
            }
            Self::Io { path, .. } => format!("Could not access checkpoint file {path}"),
            Self::Corrupted { path, .. } => format!("Checkpoint file {path} is unreadable"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Conflict { .. } | Self::JobLocked { .. } => Some(
                "Only one orchestrator may advance a job at a time; phase writes are conditional."
                    .to_string(),
            ),
            Self::Corrupted { reason, .. } | Self::Io { reason, .. } => Some(reason.clone()),
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::JobNotFound { .. } => {
                vec!["Start the job with 'fabula run <JOB_ID> --source <PATH>'".to_string()]
            }
            Self::JobExists { .. } => vec!["Use 'fabula resume <JOB_ID>' instead".to_string()],
            Self::JobLocked { .. } | Self::Conflict { .. } => vec![
                "Wait for the other run to finish, then resume".to_string(),
                "Check 'fabula status <JOB_ID>'".to_string(),
            ],
            Self::Corrupted { .. } => vec![
                "Inspect or remove the corrupted file under <home>/jobs/<JOB_ID>/".to_string(),
            ],
            Self::Io { .. } => {
                vec!["Check permissions and free space for the fabula home".to_string()]
            }
            Self::PhaseImmutable { .. } | Self::PhaseNotEnabled { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Conflict { .. } | Self::JobLocked { .. } => ErrorCategory::Concurrency,
            Self::PhaseImmutable { .. } | Self::PhaseNotEnabled { .. } => ErrorCategory::Validation,
            _ => ErrorCategory::Storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_display() {
        let err = StoreError::Conflict {
            job_id: "alpha".to_string(),
            phase: PhaseId::CharacterProfiles,
            expected: Some(PhaseStatus::Pending),
            found: Some(PhaseStatus::Running),
        };
        assert_eq!(
            err.to_string(),
            "Conflicting write to alpha/character_profiles: expected pending, found running"
        );
        assert_eq!(err.category(), ErrorCategory::Concurrency);
    }
}
