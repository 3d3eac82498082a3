use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use slacklake_core::config::{LlmConfig, LlmProvider, WarehouseConfig};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm client is not configured: {0}")]
    Configuration(String),
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm endpoint returned no completion")]
    EmptyCompletion,
}

/// Chat-completions client for OpenAI-compatible endpoints (OpenAI, Databricks
/// model serving, Ollama).
#[derive(Clone)]
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl std::fmt::Debug for HttpLlmClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpLlmClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpLlmClient {
    pub fn from_config(llm: &LlmConfig, warehouse: &WarehouseConfig) -> Result<Self, LlmError> {
        let endpoint = chat_completions_url(llm, warehouse)?;
        let api_key = match llm.provider {
            LlmProvider::Databricks => llm.api_key.clone().or_else(|| warehouse.token.clone()),
            LlmProvider::OpenAi | LlmProvider::Ollama => llm.api_key.clone(),
        };
        let client = Client::builder().timeout(Duration::from_secs(llm.timeout_secs)).build()?;

        Ok(Self { client, endpoint, api_key, model: llm.model.clone(), max_retries: llm.max_retries })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, prompt: &str) -> Result<String, LlmError> {
        let body = json!({
            "model": &self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload: ChatCompletion = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyCompletion)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request(prompt).await {
                Ok(content) => return Ok(content),
                Err(error) if attempt < self.max_retries && is_retryable(&error) => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "retrying llm request"
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Request(error) => error.is_timeout() || error.is_connect(),
        LlmError::Status { status, .. } => *status == 429 || *status >= 500,
        LlmError::Configuration(_) | LlmError::EmptyCompletion => false,
    }
}

pub fn chat_completions_url(
    llm: &LlmConfig,
    warehouse: &WarehouseConfig,
) -> Result<String, LlmError> {
    let base = match llm.provider {
        LlmProvider::OpenAi => {
            llm.base_url.clone().unwrap_or_else(|| "https://api.openai.com/v1".to_string())
        }
        LlmProvider::Databricks => match (&llm.base_url, &warehouse.host) {
            (Some(base_url), _) => base_url.clone(),
            (None, Some(host)) => format!("{}/serving-endpoints", host.trim_end_matches('/')),
            (None, None) => {
                return Err(LlmError::Configuration(
                    "databricks provider needs llm.base_url or warehouse.host".to_string(),
                ))
            }
        },
        LlmProvider::Ollama => {
            let base_url = llm.base_url.clone().ok_or_else(|| {
                LlmError::Configuration("ollama provider needs llm.base_url".to_string())
            })?;
            format!("{}/v1", base_url.trim_end_matches('/'))
        }
    };
    Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
