//! Databricks Genie spaces: a managed NL-to-SQL assistant that answers a
//! question end to end. A conversation is started in the space and its first
//! message is polled until Genie settles on a reply.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use slacklake_core::config::{GenieConfig, WarehouseConfig};

pub const EMPTY_REPLY_TEXT: &str =
    "Não consegui obter uma resposta textual do Genie para essa pergunta.";

/// What Genie said, the SQL it ran (if any) and the conversation it lives in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenieReply {
    pub text: String,
    pub sql: Option<String>,
    pub conversation_id: Option<String>,
}

#[async_trait]
pub trait GenieClient: Send + Sync {
    async fn ask(&self, space_id: &str, question: &str) -> Result<GenieReply>;
}

#[derive(Debug, Error)]
pub enum GenieError {
    #[error("genie is not configured: {0}")]
    Configuration(String),
    #[error("genie request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("genie returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("genie message ended in status {status}: {message}")]
    Failed { status: String, message: String },
    #[error("genie did not finish within {0}s")]
    TimedOut(u64),
    #[error("unexpected genie response: {0}")]
    Malformed(String),
}

#[derive(Clone)]
pub struct DatabricksGenieClient {
    client: Client,
    host: String,
    token: SecretString,
    poll_interval: Duration,
    timeout: Duration,
}

impl std::fmt::Debug for DatabricksGenieClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DatabricksGenieClient")
            .field("host", &self.host)
            .field("poll_interval", &self.poll_interval)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl DatabricksGenieClient {
    pub fn from_config(
        warehouse: &WarehouseConfig,
        genie: &GenieConfig,
    ) -> Result<Self, GenieError> {
        let (Some(host), Some(token)) = (&warehouse.host, &warehouse.token) else {
            return Err(GenieError::Configuration(
                "warehouse.host and warehouse.token are required".to_string(),
            ));
        };

        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            token: token.clone(),
            poll_interval: Duration::from_millis(genie.poll_interval_ms),
            timeout: Duration::from_secs(genie.timeout_secs),
        })
    }

    fn space_url(&self, space_id: &str) -> String {
        format!("{}/api/2.0/genie/spaces/{space_id}", self.host)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, GenieError> {
        let response = request.bearer_auth(self.token.expose_secret()).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenieError::Status { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }

    async fn start_conversation(
        &self,
        space_id: &str,
        question: &str,
    ) -> Result<(String, String), GenieError> {
        let url = format!("{}/start-conversation", self.space_url(space_id));
        let request = self.client.post(url).json(&json!({ "content": question }));
        let payload = self.send(request).await?;

        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| GenieError::Malformed(format!("missing `{name}`")))
        };
        Ok((field("conversation_id")?, field("message_id")?))
    }

    async fn wait_for_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<Value, GenieError> {
        let url = format!(
            "{}/conversations/{conversation_id}/messages/{message_id}",
            self.space_url(space_id)
        );
        let deadline = Instant::now() + self.timeout;

        loop {
            let message = self.send(self.client.get(&url)).await?;
            let status = message.get("status").and_then(Value::as_str).unwrap_or_default();
            match MessageStatus::of(status) {
                MessageStatus::Completed => return Ok(message),
                MessageStatus::Failed => {
                    let detail = message
                        .pointer("/error/error")
                        .and_then(Value::as_str)
                        .unwrap_or("no error message")
                        .to_string();
                    return Err(GenieError::Failed { status: status.to_string(), message: detail });
                }
                MessageStatus::Pending => {}
            }

            if Instant::now() + self.poll_interval > deadline {
                return Err(GenieError::TimedOut(self.timeout.as_secs()));
            }
            debug!(event_name = "genie.message.pending", status, "waiting for genie");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl GenieClient for DatabricksGenieClient {
    async fn ask(&self, space_id: &str, question: &str) -> Result<GenieReply> {
        let space_id = space_id.trim();
        if space_id.is_empty() {
            return Err(GenieError::Configuration("space id must not be empty".to_string()).into());
        }

        let (conversation_id, message_id) = self.start_conversation(space_id, question).await?;
        let message = self.wait_for_message(space_id, &conversation_id, &message_id).await?;
        if let Some(error) = message.get("error").filter(|error| !error.is_null()) {
            warn!(
                event_name = "genie.message.error",
                space_id,
                error = %error,
                "genie completed with an error attached"
            );
        }

        let mut reply = reply_from_message(&message);
        reply.conversation_id.get_or_insert(conversation_id);
        Ok(reply)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MessageStatus {
    Completed,
    Failed,
    Pending,
}

impl MessageStatus {
    fn of(status: &str) -> Self {
        match status {
            "COMPLETED" => Self::Completed,
            "FAILED" | "CANCELLED" | "QUERY_RESULT_EXPIRED" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// Joins the text attachments of a Genie message, and separately its SQL
/// attachments. A message without text gets [`EMPTY_REPLY_TEXT`].
pub fn reply_from_message(message: &Value) -> GenieReply {
    let attachments = message.get("attachments").and_then(Value::as_array);
    let collect = |pointer: &str| {
        attachments
            .into_iter()
            .flatten()
            .filter_map(|attachment| attachment.pointer(pointer).and_then(Value::as_str))
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    let text = collect("/text/content");
    let sql = collect("/query/query");
    GenieReply {
        text: if text.is_empty() { EMPTY_REPLY_TEXT.to_string() } else { text },
        sql: (!sql.is_empty()).then_some(sql),
        conversation_id: message
            .get("conversation_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
    }
}
