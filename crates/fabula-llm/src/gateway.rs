//! The model gateway: routes phase requests to the provider named in the
//! phase's model profile, enforces per-call timeouts, retries transient
//! failures and attributes cost.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabula_config::{CompletionMode, Config, ImageProfile, ModelProfile, Provider};
use fabula_utils::redaction::redact_secrets;
use fabula_utils::types::{PhaseId, Usage};
use tracing::{debug, info, warn};

use crate::anthropic::AnthropicBackend;
use crate::error::GatewayError;
use crate::http_client::HttpClient;
use crate::image::OpenAiImageBackend;
use crate::openrouter::OpenRouterBackend;
use crate::pricing::PricingTable;
use crate::types::{
    ImageBackend, ImageData, ImageOutput, ImageRequest, LlmBackend, LlmInvocation, LlmResult,
    Message,
};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// A text completion request for one phase.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub job_id: String,
    pub phase: PhaseId,
    pub profile: ModelProfile,
    pub messages: Vec<Message>,
}

/// A successful text completion with attributed cost.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResult {
    pub text: String,
    pub reasoning: Option<String>,
    pub usage: Usage,
    pub cost_usd: f64,
    pub provider: String,
    pub model: String,
}

/// Outcome of the image fallback chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResult {
    pub success: bool,
    /// Backend that produced `data`.
    pub backend: String,
    pub model: String,
    pub data: ImageData,
    pub usage_bytes: u64,
    pub cost_usd: f64,
    pub fallback_used: bool,
    /// Why the primary was skipped, when the secondary served.
    pub primary_error: Option<String>,
}

/// Read an API key from the environment.
pub(crate) fn read_api_key(env_var: &str, section: &str) -> Result<String, GatewayError> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(GatewayError::Misconfiguration(format!(
            "API key not found in environment variable '{env_var}'. \
             Set it or configure a different api_key_env in [{section}]."
        ))),
    }
}

/// Stands in for a backend whose configuration is incomplete, so the
/// failure surfaces only if a job actually routes to it.
struct UnavailableBackend {
    name: String,
    reason: String,
}

#[async_trait]
impl LlmBackend for UnavailableBackend {
    async fn invoke(&self, _inv: LlmInvocation) -> Result<LlmResult, GatewayError> {
        Err(GatewayError::Misconfiguration(self.reason.clone()))
    }
}

#[async_trait]
impl ImageBackend for UnavailableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _request: ImageRequest) -> Result<ImageOutput, GatewayError> {
        Err(GatewayError::Misconfiguration(self.reason.clone()))
    }
}

pub struct ModelGateway {
    text_backends: HashMap<Provider, Arc<dyn LlmBackend>>,
    image_primary: Option<Arc<dyn ImageBackend>>,
    image_secondary: Option<Arc<dyn ImageBackend>>,
    pricing: PricingTable,
    call_timeout: Duration,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("providers", &self.text_backends.keys().collect::<Vec<_>>())
            .field("image_primary", &self.image_primary.as_ref().map(|b| b.name().to_string()))
            .field(
                "image_secondary",
                &self.image_secondary.as_ref().map(|b| b.name().to_string()),
            )
            .field("call_timeout", &self.call_timeout)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ModelGateway {
    pub fn builder() -> ModelGatewayBuilder {
        ModelGatewayBuilder::default()
    }

    /// Build the production gateway from configuration.
    ///
    /// Missing API keys do not fail construction; the affected backend
    /// reports `Misconfiguration` when first used.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let client = HttpClient::new()?;

        let mut builder = Self::builder()
            .pricing(PricingTable::with_overrides(&config.pricing))
            .call_timeout(Duration::from_secs(config.defaults.call_timeout_secs))
            .max_attempts(config.defaults.max_attempts);

        builder = match AnthropicBackend::from_config(client.clone(), &config.gateway.anthropic) {
            Ok(backend) => builder.text_backend(Provider::Anthropic, Arc::new(backend)),
            Err(e) => builder.text_backend(Provider::Anthropic, unavailable("anthropic", &e)),
        };
        builder = match OpenRouterBackend::from_config(client.clone(), &config.gateway.openrouter)
        {
            Ok(backend) => builder.text_backend(Provider::OpenRouter, Arc::new(backend)),
            Err(e) => builder.text_backend(Provider::OpenRouter, unavailable("openrouter", &e)),
        };

        let primary = &config.images.primary;
        builder = match OpenAiImageBackend::from_config(client.clone(), primary) {
            Ok(backend) => builder.image_primary(Arc::new(backend)),
            Err(e) => builder.image_primary(unavailable(&primary.name, &e)),
        };
        if let Some(secondary) = &config.images.secondary {
            builder = match OpenAiImageBackend::from_config(client, secondary) {
                Ok(backend) => builder.image_secondary(Arc::new(backend)),
                Err(e) => builder.image_secondary(unavailable(&secondary.name, &e)),
            };
        }

        Ok(builder.build())
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Run one text completion with the phase's profile.
    ///
    /// Transient failures are retried up to `max_attempts` with linear
    /// backoff; every attempt is bounded by the call timeout. Auth and
    /// quota errors are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last `GatewayError` once attempts are exhausted, or the
    /// first non-transient error.
    pub async fn complete(&self, request: CompletionRequest) -> Result<GatewayResult, GatewayError> {
        let provider = request.profile.provider;
        let backend = self.text_backends.get(&provider).ok_or_else(|| {
            GatewayError::Misconfiguration(format!("no backend registered for provider '{provider}'"))
        })?;

        let invocation = LlmInvocation {
            job_id: request.job_id,
            phase: request.phase,
            model: request.profile.model_id.clone(),
            timeout: self.call_timeout,
            max_output_tokens: request.profile.max_output_tokens,
            reasoning: match request.profile.mode {
                CompletionMode::Reasoning => Some(request.profile.reasoning_effort),
                CompletionMode::Plain => None,
            },
            messages: request.messages,
        };

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let outcome =
                match tokio::time::timeout(self.call_timeout, backend.invoke(invocation.clone()))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(GatewayError::Timeout {
                        duration: self.call_timeout,
                    }),
                };

            match outcome {
                Ok(result) => break result,
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        provider = %provider,
                        phase = %invocation.phase,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %redact_secrets(&e.to_string()),
                        "Transient gateway error, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        };

        let cost_usd = self.pricing.text_cost(&result.model_used, &result.usage);
        debug!(
            provider = %result.provider,
            model = %result.model_used,
            attempts = attempt,
            cost_usd,
            "Completion succeeded"
        );

        Ok(GatewayResult {
            text: result.text,
            reasoning: result.reasoning,
            usage: result.usage,
            cost_usd,
            provider: result.provider,
            model: result.model_used,
        })
    }

    /// Generate an image, trying the primary backend and then the
    /// secondary exactly once.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::ImageChainExhausted` when no backend produced data.
    pub async fn generate_image(
        &self,
        prompt: &str,
        profile: &ImageProfile,
    ) -> Result<ImageResult, GatewayError> {
        let request = ImageRequest {
            prompt: prompt.to_string(),
            size: profile.size.clone(),
            quality: profile.quality.clone(),
            timeout: self.call_timeout,
        };

        let primary = self.image_primary.as_ref().ok_or_else(|| {
            GatewayError::Misconfiguration("no primary image backend configured".to_string())
        })?;

        let primary_error = match self.try_image(primary.as_ref(), request.clone()).await {
            Ok((data, model)) => {
                return Ok(self.image_result(primary.name(), model, data, false, None));
            }
            Err(e) => redact_secrets(&e.to_string()),
        };

        let Some(secondary) = &self.image_secondary else {
            warn!(backend = %primary.name(), error = %primary_error, "Image generation failed; no fallback configured");
            return Err(GatewayError::ImageChainExhausted {
                primary: primary_error,
                secondary: None,
            });
        };

        info!(
            primary = %primary.name(),
            secondary = %secondary.name(),
            error = %primary_error,
            "Primary image backend failed, trying fallback"
        );

        match self.try_image(secondary.as_ref(), request).await {
            Ok((data, model)) => Ok(self.image_result(
                secondary.name(),
                model,
                data,
                true,
                Some(primary_error),
            )),
            Err(e) => Err(GatewayError::ImageChainExhausted {
                primary: primary_error,
                secondary: Some(redact_secrets(&e.to_string())),
            }),
        }
    }

    async fn try_image(
        &self,
        backend: &dyn ImageBackend,
        request: ImageRequest,
    ) -> Result<(ImageData, String), GatewayError> {
        let output = match tokio::time::timeout(self.call_timeout, backend.generate(request)).await
        {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(GatewayError::Timeout {
                    duration: self.call_timeout,
                });
            }
        };
        match output.data {
            Some(data) if !data.is_empty() => Ok((data, output.model_used)),
            _ => Err(GatewayError::NoImageData {
                backend: backend.name().to_string(),
            }),
        }
    }

    fn image_result(
        &self,
        backend: &str,
        model: String,
        data: ImageData,
        fallback_used: bool,
        primary_error: Option<String>,
    ) -> ImageResult {
        ImageResult {
            success: true,
            backend: backend.to_string(),
            cost_usd: self.pricing.image_cost(&model),
            usage_bytes: data.len() as u64,
            model,
            data,
            fallback_used,
            primary_error,
        }
    }
}

fn unavailable(name: &str, error: &GatewayError) -> Arc<UnavailableBackend> {
    debug!(backend = name, error = %error, "Backend unavailable");
    Arc::new(UnavailableBackend {
        name: name.to_string(),
        reason: error.to_string(),
    })
}

#[derive(Default)]
pub struct ModelGatewayBuilder {
    text_backends: HashMap<Provider, Arc<dyn LlmBackend>>,
    image_primary: Option<Arc<dyn ImageBackend>>,
    image_secondary: Option<Arc<dyn ImageBackend>>,
    pricing: Option<PricingTable>,
    call_timeout: Option<Duration>,
    max_attempts: Option<u32>,
    retry_backoff: Option<Duration>,
}

impl ModelGatewayBuilder {
    #[must_use]
    pub fn text_backend(mut self, provider: Provider, backend: Arc<dyn LlmBackend>) -> Self {
        self.text_backends.insert(provider, backend);
        self
    }

    #[must_use]
    pub fn image_primary(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.image_primary = Some(backend);
        self
    }

    #[must_use]
    pub fn image_secondary(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.image_secondary = Some(backend);
        self
    }

    #[must_use]
    pub fn pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = Some(pricing);
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = Some(backoff);
        self
    }

    pub fn build(self) -> ModelGateway {
        ModelGateway {
            text_backends: self.text_backends,
            image_primary: self.image_primary,
            image_secondary: self.image_secondary,
            pricing: self.pricing.unwrap_or_default(),
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            max_attempts: self.max_attempts.unwrap_or(3).max(1),
            retry_backoff: self.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
        }
    }
}
