//! Shared HTTP client for the text and image backends.
//!
//! One `reqwest::Client` is built per gateway and shared by every backend.
//! Each call here is a single request; retrying transient failures is the
//! gateway's job.

use std::sync::Arc;
use std::time::Duration;

use fabula_utils::redaction::redact_secrets;
use reqwest::{Client, Response, StatusCode};
use tracing::debug;

use crate::error::GatewayError;

/// Upper bound on any single HTTP request (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for model providers
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_timeout", &self.max_timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, GatewayError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                GatewayError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    /// Start a POST request on the shared client.
    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url)
    }

    /// Send one request, bounded by `min(timeout, max_timeout)`.
    ///
    /// # Errors
    ///
    /// Non-success statuses map through `status_error`; a deadline hit is
    /// `Timeout` and any other send failure is `Transport`.
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
        provider: &str,
    ) -> Result<Response, GatewayError> {
        let deadline = timeout.min(self.max_timeout);
        debug!(provider, timeout_secs = deadline.as_secs(), "Sending HTTP request");

        let response = request.timeout(deadline).send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout { duration: deadline }
            } else {
                GatewayError::Transport(format!(
                    "{provider} request failed: {}",
                    redact_secrets(&e.to_string())
                ))
            }
        })?;

        match status_error(response.status(), provider) {
            Some(err) => Err(err),
            None => Ok(response),
        }
    }
}

/// Classify a response status. `None` means the body is worth reading.
///
/// Auth and quota statuses are fatal to the call. 5xx is an outage the
/// gateway may retry. Any other 4xx is a request the provider will keep
/// rejecting, so it is reported as unsupported and never retried.
pub(crate) fn status_error(status: StatusCode, provider: &str) -> Option<GatewayError> {
    if status.is_success() {
        return None;
    }
    let err = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            GatewayError::ProviderAuth(format!("{provider} rejected the credentials ({status})"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            GatewayError::ProviderQuota(format!("{provider} is rate limiting ({status})"))
        }
        StatusCode::REQUEST_TIMEOUT => {
            GatewayError::Transport(format!("{provider} timed out the request ({status})"))
        }
        s if s.is_server_error() => {
            GatewayError::ProviderOutage(format!("{provider} is unavailable ({status})"))
        }
        _ => GatewayError::Unsupported(format!("{provider} refused the request ({status})")),
    };
    Some(err)
}

/// Decode a JSON response body, mapping failures to `Transport`.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
    provider_name: &str,
) -> Result<T, GatewayError> {
    response.json::<T>().await.map_err(|e| {
        GatewayError::Transport(format!(
            "{provider_name} returned an unreadable body: {}",
            redact_secrets(&e.to_string())
        ))
    })
}
