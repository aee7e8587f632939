//! LLM client: the single point of entry for text-generation calls.
//!
//! Talks to a local Ollama-compatible server: `POST /api/generate` for
//! completions and `GET /api/tags` for the liveness probe. Calls are made once;
//! a failed generation is reported to the caller, never retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to reach text generation backend: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("text generation backend error (status {status}): {message}")]
    BadStatus { status: u16, message: String },

    #[error("received empty response from text generation backend")]
    EmptyResponse,
}

/// A text-completion backend. `LlmClient` is the production implementation;
/// tests drive the annotation pipeline with canned responses.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the raw completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Lists the models the backend can serve. Used as a liveness probe.
    async fn available_models(&self) -> Result<Vec<String>, LlmError>;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request_body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                message,
            });
        }

        let generated: GenerateResponse = response.json().await?;
        debug!(
            "Generation finished: prompt_tokens={:?}, output_tokens={:?}",
            generated.prompt_eval_count, generated.eval_count
        );

        let text = generated.response.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    async fn available_models(&self) -> Result<Vec<String>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
