use camino::Utf8PathBuf;
use fabula_utils::error::{ErrorCategory, UserFriendlyError};

/// Reasoning memory failures. Callers treat these as non-fatal.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write trace {path}: {reason}")]
    Write { path: Utf8PathBuf, reason: String },

    #[error("Corrupted trace file {path}: {source}")]
    Corrupted {
        path: Utf8PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Quality score {score} is out of range (0-10)")]
    InvalidScore { score: u8 },
}

impl UserFriendlyError for MemoryError {
    fn user_message(&self) -> String {
        match self {
            Self::Io { path, .. } | Self::Write { path, .. } => {
                format!("Reasoning memory could not access {path}")
            }
            Self::Corrupted { path, .. } => format!("Reasoning trace {path} is unreadable"),
            Self::InvalidScore { score } => format!("Invalid trace quality score {score}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("Reasoning memory is best-effort; jobs continue without it.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Corrupted { .. } => vec!["Delete the unreadable trace file".to_string()],
            Self::Io { .. } | Self::Write { .. } => {
                vec!["Check permissions on the fabula home directory".to_string()]
            }
            Self::InvalidScore { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Storage
    }
}
