use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {preview}")]
    Status { status: StatusCode, preview: String },
    #[error("unexpected completion response shape: {0}")]
    Shape(String),
}

/// External-service boundary for the completion call. Implementations return
/// either the raw completion text or a typed failure; nothing downstream
/// assumes the call succeeded.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Backend for `generateContent`-shaped endpoints (Gemini and compatible).
pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiBackend {
    pub fn new(config: &LlmConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("shopsight/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}?key={}", self.endpoint, self.api_key);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let preview: String = text.chars().take(180).collect();
            return Err(LlmError::Status { status, preview });
        }
        let value: Value =
            serde_json::from_str(&text).map_err(|e| LlmError::Shape(e.to_string()))?;
        extract_candidate_text(&value)
    }
}

/// Pull the first candidate's text out of a `generateContent` response.
pub fn extract_candidate_text(value: &Value) -> Result<String, LlmError> {
    value["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            LlmError::Shape("missing candidates[0].content.parts[0].text".to_string())
        })
}
