//! OpenAI-compatible chat-completions client used as the inference backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, InferenceBackend};
use crate::config::InferenceConfig;
use crate::{Error, Result};

/// OpenAI client.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAIClient {
    /// Create client from inference settings.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let mut client = Self::new(&config.api_key, &config.base_url, &config.model)?;
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        client.http = build_http(Duration::from_secs(config.timeout_secs))?;
        Ok(client)
    }

    /// Create client with API key, base URL and model.
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(Error::Config("OPENAI_API_KEY is empty".to_string()));
        }
        if model.trim().is_empty() {
            return Err(Error::Config(
                "OPENAI_INFERENCE_MODEL_NAME is empty".to_string(),
            ));
        }

        Ok(Self {
            http: build_http(Duration::from_secs(crate::config::DEFAULT_INFERENCE_TIMEOUT_SECS))?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Chat completion.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: temperature.or(self.temperature),
            max_tokens: max_tokens.or(self.max_tokens),
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Http(format!("Inference request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::Http(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Inference(format!(
                "LLM API error {}: {}",
                status, text
            )));
        }

        let chat_response: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| Error::Inference(format!("Invalid response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Inference("Empty response from LLM API".to_string()))
    }
}

fn build_http(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent("graphrag_pipeline/0.1.0")
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Config(format!("HTTP client error: {}", e)))
}

#[async_trait]
impl InferenceBackend for OpenAIClient {
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        self.chat_completion(messages, temperature, max_tokens).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
