use std::time::Duration;

use async_trait::async_trait;
use fabula_config::ReasoningEffort;
use fabula_utils::types::{PhaseId, Usage};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One provider call, fully resolved from the phase's model profile.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    pub job_id: String,
    pub phase: PhaseId,
    pub model: String,
    pub timeout: Duration,
    pub max_output_tokens: u32,
    /// `Some` requests an intermediate reasoning trace at that effort.
    pub reasoning: Option<ReasoningEffort>,
    pub messages: Vec<Message>,
}

impl LlmInvocation {
    /// Concatenated system prompt, if any.
    #[must_use]
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// What a text backend returned.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResult {
    pub text: String,
    /// Reasoning trace; `None` in plain mode or when the provider omitted it.
    pub reasoning: Option<String>,
    pub provider: String,
    pub model_used: String,
    pub usage: Usage,
}

impl LlmResult {
    pub fn new(
        text: impl Into<String>,
        provider: impl Into<String>,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
            provider: provider.into(),
            model_used: model_used.into(),
            usage: Usage::default(),
        }
    }

    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    #[must_use]
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A text completion provider.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub timeout: Duration,
}

/// Generated image payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ImageData {
    Base64(String),
    Url(String),
}

impl ImageData {
    /// Size of the payload as returned by the backend.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Base64(s) | Self::Url(s) => s.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One image backend's answer. `data` is `None` when the backend
/// responded successfully but produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutput {
    pub data: Option<ImageData>,
    pub model_used: String,
}

/// An image generation endpoint.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Label recorded as the serving backend.
    fn name(&self) -> &str;

    async fn generate(&self, request: ImageRequest) -> Result<ImageOutput, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_joins_system_messages() {
        let inv = LlmInvocation {
            job_id: "j".to_string(),
            phase: PhaseId::DnaExtraction,
            model: "m".to_string(),
            timeout: Duration::from_secs(1),
            max_output_tokens: 10,
            reasoning: None,
            messages: vec![
                Message::system("one"),
                Message::user("hi"),
                Message::system("two"),
            ],
        };
        assert_eq!(inv.system_prompt().as_deref(), Some("one\n\ntwo"));
    }

    #[test]
    fn test_image_data_serialization() {
        let data = ImageData::Url("https://img".to_string());
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["kind"], "url");
        assert_eq!(json["value"], "https://img");
        assert_eq!(data.len(), 10);
    }
}
