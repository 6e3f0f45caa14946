//! Anthropic Messages API backend.
//!
//! In reasoning mode the request enables extended thinking with a token
//! budget derived from the profile's effort; the returned `thinking`
//! blocks become the reasoning trace.

use async_trait::async_trait;
use fabula_config::ProviderConfig;
use fabula_utils::types::Usage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::http_client::{HttpClient, read_json};
use crate::types::{LlmBackend, LlmInvocation, LlmResult, Message, Role};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Sampling temperature for plain completions. Extended thinking
/// requires the provider default, so it is omitted there.
const PLAIN_TEMPERATURE: f32 = 0.2;

#[derive(Clone)]
pub struct AnthropicBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(client: HttpClient, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Build from `[gateway.anthropic]`, reading the key from its env var.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the API key variable is unset or empty.
    pub fn from_config(client: HttpClient, config: &ProviderConfig) -> Result<Self, GatewayError> {
        let api_key = crate::gateway::read_api_key(&config.api_key_env, "gateway.anthropic")?;
        Ok(Self::new(client, config.base_url.clone(), api_key))
    }

    /// Split system messages out of the conversation.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut converted = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => match system_prompt.as_mut() {
                    Some(existing) => {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    }
                    None => system_prompt = Some(msg.content.clone()),
                },
                Role::User | Role::Assistant => converted.push(AnthropicMessage {
                    role: if msg.role == Role::User { "user" } else { "assistant" },
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, converted)
    }

    fn build_request(inv: &LlmInvocation) -> AnthropicRequest {
        let (system, messages) = Self::convert_messages(&inv.messages);

        match inv.reasoning {
            Some(effort) => {
                let budget = effort.budget_tokens();
                AnthropicRequest {
                    model: inv.model.clone(),
                    messages,
                    max_tokens: inv.max_output_tokens.saturating_add(budget),
                    temperature: None,
                    system,
                    thinking: Some(ThinkingConfig {
                        kind: "enabled",
                        budget_tokens: budget,
                    }),
                }
            }
            None => AnthropicRequest {
                model: inv.model.clone(),
                messages,
                max_tokens: inv.max_output_tokens,
                temperature: Some(PLAIN_TEMPERATURE),
                system,
                thinking: None,
            },
        }
    }

    fn parse_response(body: AnthropicResponse, model: &str) -> LlmResult {
        let mut text = String::new();
        let mut thinking = String::new();

        for block in body.content {
            match block.content_type.as_str() {
                "text" => {
                    if let Some(t) = block.text {
                        text.push_str(&t);
                    }
                }
                "thinking" => {
                    if let Some(t) = block.thinking {
                        if !thinking.is_empty() {
                            thinking.push_str("\n\n");
                        }
                        thinking.push_str(&t);
                    }
                }
                _ => {}
            }
        }

        if text.is_empty() {
            warn!(model, "Anthropic response carried no text block");
        }

        let mut result = LlmResult::new(text, "anthropic", body.model.unwrap_or_else(|| model.to_string()));
        if !thinking.trim().is_empty() {
            result = result.with_reasoning(thinking);
        }
        if let Some(usage) = body.usage {
            result = result.with_usage(Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                ..Usage::default()
            });
        }
        result
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, GatewayError> {
        let body = Self::build_request(&inv);

        debug!(
            provider = "anthropic",
            model = %inv.model,
            phase = %inv.phase,
            max_tokens = body.max_tokens,
            thinking = body.thinking.is_some(),
            timeout_secs = inv.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response = self
            .client
            .send(request, inv.timeout, "anthropic")
            .await?;
        let parsed: AnthropicResponse = read_json(response, "anthropic").await?;
        let result = Self::parse_response(parsed, &inv.model);

        debug!(
            provider = "anthropic",
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            has_reasoning = result.reasoning.is_some(),
            "Anthropic invocation completed"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
    thinking: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
