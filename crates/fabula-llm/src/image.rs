//! OpenAI-compatible image generation backend.
//!
//! Both the primary and the secondary image endpoints speak the
//! `POST {base_url}/images/generations` dialect; they differ only in URL,
//! key and model.

use async_trait::async_trait;
use fabula_config::ImageBackendConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GatewayError;
use crate::http_client::{HttpClient, read_json};
use crate::types::{ImageBackend, ImageData, ImageOutput, ImageRequest};

#[derive(Clone)]
pub struct OpenAiImageBackend {
    client: HttpClient,
    name: String,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiImageBackend {
    pub fn new(
        client: HttpClient,
        name: impl Into<String>,
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            name: name.into(),
            endpoint: format!("{}/images/generations", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// # Errors
    ///
    /// Returns `GatewayError::Misconfiguration` if the API key variable is unset or empty.
    pub fn from_config(
        client: HttpClient,
        config: &ImageBackendConfig,
    ) -> Result<Self, GatewayError> {
        let api_key =
            crate::gateway::read_api_key(&config.api_key_env, &format!("images.{}", config.name))?;
        Ok(Self::new(
            client,
            config.name.clone(),
            &config.base_url,
            api_key,
            config.model.clone(),
        ))
    }

    fn build_request<'a>(&'a self, request: &'a ImageRequest) -> GenerationRequest<'a> {
        GenerationRequest {
            model: &self.model,
            prompt: &request.prompt,
            n: 1,
            size: &request.size,
            quality: &request.quality,
        }
    }

    fn parse_response(&self, body: GenerationResponse) -> ImageOutput {
        let data = body.data.into_iter().find_map(|item| {
            match (item.b64_json.filter(|s| !s.is_empty()), item.url.filter(|s| !s.is_empty())) {
                (Some(b64), _) => Some(ImageData::Base64(b64)),
                (None, Some(url)) => Some(ImageData::Url(url)),
                (None, None) => None,
            }
        });
        ImageOutput {
            data,
            model_used: self.model.clone(),
        }
    }
}

#[async_trait]
impl ImageBackend for OpenAiImageBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: ImageRequest) -> Result<ImageOutput, GatewayError> {
        debug!(
            backend = %self.name,
            model = %self.model,
            size = %request.size,
            timeout_secs = request.timeout.as_secs(),
            "Requesting image generation"
        );

        let http_request = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_request(&request));

        let response = self
            .client
            .send(http_request, request.timeout, &self.name)
            .await?;
        let body: GenerationResponse = read_json(response, &self.name).await?;
        Ok(self.parse_response(body))
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    quality: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    b64_json: Option<String>,
    url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn backend() -> OpenAiImageBackend {
        OpenAiImageBackend::new(
            HttpClient::new().unwrap(),
            "together",
            "https://api.together.xyz/v1/",
            "key",
            "flux",
        )
    }

    #[test]
    fn test_endpoint_joins_path() {
        assert_eq!(
            backend().endpoint,
            "https://api.together.xyz/v1/images/generations"
        );
    }

    #[test]
    fn test_request_body() {
        let b = backend();
        let req = ImageRequest {
            prompt: "a lighthouse".to_string(),
            size: "512x512".to_string(),
            quality: "standard".to_string(),
            timeout: Duration::from_secs(10),
        };
        let json = serde_json::to_value(b.build_request(&req)).unwrap();
        assert_eq!(json["model"], "flux");
        assert_eq!(json["n"], 1);
        assert_eq!(json["size"], "512x512");
    }

    #[test]
    fn test_parse_prefers_base64_then_url() {
        let b = backend();
        let body: GenerationResponse = serde_json::from_value(serde_json::json!({
            "data": [{"b64_json": "", "url": "https://img/1.png"}]
        }))
        .unwrap();
        assert_eq!(
            b.parse_response(body).data,
            Some(ImageData::Url("https://img/1.png".to_string()))
        );

        let body: GenerationResponse =
            serde_json::from_value(serde_json::json!({"data": [{"b64_json": "aGk="}]})).unwrap();
        assert_eq!(
            b.parse_response(body).data,
            Some(ImageData::Base64("aGk=".to_string()))
        );
    }

    #[test]
    fn test_parse_empty_data_is_none() {
        let body: GenerationResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(backend().parse_response(body).data.is_none());
    }
}
