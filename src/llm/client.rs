use std::time::Duration;

use serde_json::json;
use thiserror::Error;

/// Failures surfaced by the reasoning service. Size-limit rejections get
/// their own variant so callers can shrink the prompt and retry once.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("prompt exceeds the model context window: {0}")]
    ContextLength(String),
    #[error("completion api error: {0}")]
    Api(String),
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// The reasoning service as the pipeline sees it: one role-tagged prompt
/// in, one text completion out. Implemented by [`LlmClient`] and by
/// scripted doubles in tests.
pub trait LlmApi {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Chat-completions client for any OpenAI-compatible service. Built once
/// at startup and passed by reference into each pipeline stage.
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            api_key,
            base_url,
            model,
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

impl LlmApi for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&json!({
                "model": self.model,
                "messages": [
                    {
                        "role": "system",
                        "content": "You are an assistant."
                    },
                    {
                        "role": "user",
                        "content": prompt
                    }
                ],
                "temperature": 0.1
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST
                && error_text.contains("context_length_exceeded")
            {
                return Err(LlmError::ContextLength(error_text));
            }
            return Err(LlmError::Api(format!("{status}: {error_text}")));
        }

        let response_json: serde_json::Value = response.json().await?;

        let answer = response_json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        if answer.is_empty() {
            return Err(LlmError::Api("empty completion".to_string()));
        }

        Ok(answer)
    }
}
