use std::time::Duration;

use fabula_utils::error::{ErrorCategory, UserFriendlyError};

/// Errors that can occur during gateway operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Network-level failure (connect, reset, malformed body)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// A single call exceeded its time limit
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// An image backend answered without any image
    #[error("Image backend '{backend}' returned no image data")]
    NoImageData { backend: String },

    /// Every configured image backend failed
    #[error("Image generation failed: primary: {primary}; secondary: {}", secondary.as_deref().unwrap_or("not configured"))]
    ImageChainExhausted {
        primary: String,
        secondary: Option<String>,
    },
}

impl GatewayError {
    /// Whether another attempt may succeed: network failures, timeouts and 5xx.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::ProviderOutage(_)
        )
    }

    /// Auth and quota failures propagate immediately and are never retried.
    #[must_use]
    pub const fn is_quota_or_auth(&self) -> bool {
        matches!(self, Self::ProviderAuth(_) | Self::ProviderQuota(_))
    }
}

impl UserFriendlyError for GatewayError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Model provider could not be reached: {msg}"),
            Self::ProviderAuth(msg) => format!("Model provider rejected the credentials: {msg}"),
            Self::ProviderQuota(msg) => format!("Model provider quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Model provider is unavailable: {msg}"),
            Self::Timeout { duration } => {
                format!("Model call timed out after {}s", duration.as_secs())
            }
            Self::Misconfiguration(msg) => format!("Model gateway configuration error: {msg}"),
            Self::Unsupported(msg) => format!("Unsupported model request: {msg}"),
            Self::NoImageData { backend } => {
                format!("Image backend '{backend}' returned no image")
            }
            Self::ImageChainExhausted { .. } => {
                "Both image backends failed to produce cover art".to_string()
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) | Self::Timeout { .. } => Some(
                "Transient failures were retried up to defaults.max_attempts before giving up."
                    .to_string(),
            ),
            Self::ProviderAuth(_) | Self::ProviderQuota(_) => Some(
                "Authentication and quota errors are not retried; the phase is marked failed."
                    .to_string(),
            ),
            Self::Misconfiguration(_) | Self::Unsupported(_) => None,
            Self::NoImageData { .. } | Self::ImageChainExhausted { .. } => Some(
                "The primary image backend is tried first, then the secondary once.".to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Transport(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and run 'fabula resume <JOB_ID>'".to_string(),
                "Check the provider's status page".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase defaults.call_timeout_secs or pass --call-timeout".to_string(),
                "Use a faster profile such as 'fast'".to_string(),
            ],
            Self::ProviderAuth(_) => vec![
                "Check that the API key environment variable is set and valid".to_string(),
            ],
            Self::ProviderQuota(_) => vec![
                "Wait for the rate limit window to reset, then resume the job".to_string(),
                "Check your provider usage dashboard".to_string(),
            ],
            Self::Misconfiguration(_) | Self::Unsupported(_) => vec![
                "Review the [gateway] and [profiles] sections of .fabula/config.toml".to_string(),
            ],
            Self::NoImageData { .. } | Self::ImageChainExhausted { .. } => vec![
                "Check the [images.primary] and [images.secondary] settings".to_string(),
                "Disable cover art with [pipeline] cover_art = false".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::ModelProvider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::Transport("x".into()).is_transient());
        assert!(GatewayError::ProviderOutage("x".into()).is_transient());
        assert!(
            GatewayError::Timeout {
                duration: Duration::from_secs(1)
            }
            .is_transient()
        );
        assert!(!GatewayError::ProviderAuth("x".into()).is_transient());
        assert!(!GatewayError::ProviderQuota("x".into()).is_transient());
        assert!(GatewayError::ProviderQuota("x".into()).is_quota_or_auth());
        assert!(!GatewayError::Misconfiguration("x".into()).is_transient());
    }

    #[test]
    fn test_chain_exhausted_display() {
        let err = GatewayError::ImageChainExhausted {
            primary: "503".to_string(),
            secondary: None,
        };
        assert_eq!(
            err.to_string(),
            "Image generation failed: primary: 503; secondary: not configured"
        );
    }
}
