//! OpenRouter backend (OpenAI-compatible chat completions).
//!
//! Reasoning mode sends `reasoning.effort`; the trace comes back in
//! `choices[0].message.reasoning`.

use async_trait::async_trait;
use fabula_config::ProviderConfig;
use fabula_utils::types::Usage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::http_client::{HttpClient, read_json};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Role};

const REFERER: &str = "https://github.com/fabula-rs/fabula";
const TITLE: &str = "fabula";
const PLAIN_TEMPERATURE: f32 = 0.2;

#[derive(Clone)]
pub struct OpenRouterBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl OpenRouterBackend {
    pub fn new(client: HttpClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the API key variable is unset or empty.
    pub fn from_config(client: HttpClient, config: &ProviderConfig) -> Result<Self, GatewayError> {
        let api_key = crate::gateway::read_api_key(&config.api_key_env, "gateway.openrouter")?;
        Ok(Self::new(client, config.base_url.clone(), api_key))
    }

    fn build_request(inv: &LlmInvocation) -> OpenRouterRequest {
        let messages = inv
            .messages
            .iter()
            .map(|m| OpenAiMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();

        OpenRouterRequest {
            model: inv.model.clone(),
            messages,
            max_tokens: inv.max_output_tokens,
            temperature: inv.reasoning.is_none().then_some(PLAIN_TEMPERATURE),
            reasoning: inv.reasoning.map(|effort| ReasoningConfig {
                effort: effort.as_str(),
            }),
        }
    }

    fn parse_response(body: OpenRouterResponse, model: &str) -> Result<LlmResult, GatewayError> {
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            GatewayError::Transport("OpenRouter response missing choices[0]".to_string())
        })?;

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() {
            warn!(model, "OpenRouter response carried no content");
        }

        let mut result = LlmResult::new(text, "openrouter", body.model.unwrap_or_else(|| model.to_string()));
        if let Some(reasoning) = choice.message.reasoning.filter(|r| !r.trim().is_empty()) {
            result = result.with_reasoning(reasoning);
        }
        if let Some(usage) = body.usage {
            result = result.with_usage(Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                reasoning_tokens: usage
                    .completion_tokens_details
                    .and_then(|d| d.reasoning_tokens)
                    .unwrap_or(0),
                ..Usage::default()
            });
        }
        Ok(result)
    }
}

#[async_trait]
impl LlmBackend for OpenRouterBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, GatewayError> {
        let body = Self::build_request(&inv);

        debug!(
            provider = "openrouter",
            model = %inv.model,
            phase = %inv.phase,
            max_tokens = body.max_tokens,
            reasoning = body.reasoning.is_some(),
            timeout_secs = inv.timeout.as_secs(),
            "Invoking OpenRouter backend"
        );

        let request = self
            .client
            .post(&self.base_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", REFERER)
            .header("X-Title", TITLE)
            .header("Content-Type", "application/json")
            .json(&body);

        let response = self
            .client
            .send(request, inv.timeout, "openrouter")
            .await?;
        let parsed: OpenRouterResponse = read_json(response, "openrouter").await?;
        let result = Self::parse_response(parsed, &inv.model)?;

        debug!(
            provider = "openrouter",
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            has_reasoning = result.reasoning.is_some(),
            "OpenRouter invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ReasoningConfig {
    effort: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<ReasoningConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenRouterResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<OpenRouterUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OpenRouterUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
struct CompletionDetails {
    reasoning_tokens: Option<u64>,
}
