//! Model gateway for fabula.
//!
//! Text phases go through an [`LlmBackend`] chosen by the phase's model
//! profile (Anthropic or OpenRouter, reasoning or plain mode). The image
//! phase goes through an [`ImageBackend`] fallback chain. [`ModelGateway`]
//! adds per-call timeouts, bounded retry of transient failures and cost
//! attribution from a [`PricingTable`].

mod anthropic;
mod error;
mod gateway;
mod http_client;
mod image;
mod openrouter;
mod pricing;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

pub use anthropic::AnthropicBackend;
pub use error::GatewayError;
pub use gateway::{CompletionRequest, GatewayResult, ImageResult, ModelGateway, ModelGatewayBuilder};
pub use http_client::HttpClient;
pub use image::OpenAiImageBackend;
pub use openrouter::OpenRouterBackend;
pub use pricing::PricingTable;
pub use types::{
    ImageBackend, ImageData, ImageOutput, ImageRequest, LlmBackend, LlmInvocation, LlmResult,
    Message, Role,
};

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptedBackend, ScriptedImageBackend};
