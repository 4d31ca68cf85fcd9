//! External collaborators reached over HTTP.
//!
//! Provides:
//! - [`InferenceBackend`] and its OpenAI-compatible client
//! - [`RateLimiter`] and its HTTP client for the leaky-bucket service
//! - [`RateLimitedGateway`], the admission-then-inference path every call takes

pub mod gateway;
pub mod openai;
pub mod rate_limiter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use gateway::{estimate_messages_tokens, estimate_tokens, RateLimitedGateway};
pub use openai::OpenAIClient;
pub use rate_limiter::{AdmissionStatus, HttpRateLimiter, RateLimiter};

/// Chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
        }
    }
}

/// Turns a prompt into text. Stateless across calls.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}
