use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use slacklake_core::config::WarehouseConfig;
use slacklake_core::QueryResult;

#[async_trait]
pub trait WarehouseClient: Send + Sync {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;
}

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("warehouse is not configured: {0}")]
    Configuration(String),
    #[error("warehouse request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("warehouse returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("statement ended in state {state}: {message}")]
    Statement { state: String, message: String },
    #[error("unexpected statement response: {0}")]
    Malformed(String),
}

/// Databricks SQL Statement Execution API client (`/api/2.0/sql/statements`),
/// inline JSON results only.
#[derive(Clone)]
pub struct DatabricksSqlClient {
    client: Client,
    host: String,
    warehouse_id: String,
    token: SecretString,
    wait_timeout_secs: u64,
}

impl std::fmt::Debug for DatabricksSqlClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("DatabricksSqlClient")
            .field("host", &self.host)
            .field("warehouse_id", &self.warehouse_id)
            .finish_non_exhaustive()
    }
}

impl DatabricksSqlClient {
    pub fn from_config(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let (Some(host), Some(warehouse_id), Some(token)) =
            (&config.host, &config.warehouse_id, &config.token)
        else {
            return Err(WarehouseError::Configuration(
                "warehouse.host, warehouse.warehouse_id and warehouse.token are required"
                    .to_string(),
            ));
        };

        // The HTTP timeout has to outlive the server-side wait.
        let client =
            Client::builder().timeout(Duration::from_secs(config.timeout_secs + 10)).build()?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            warehouse_id: warehouse_id.clone(),
            token: token.clone(),
            wait_timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl WarehouseClient for DatabricksSqlClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let body = json!({
            "statement": sql,
            "warehouse_id": &self.warehouse_id,
            "wait_timeout": format!("{}s", self.wait_timeout_secs),
            "on_wait_timeout": "CANCEL",
            "disposition": "INLINE",
            "format": "JSON_ARRAY",
        });

        let response = self
            .client
            .post(format!("{}/api/2.0/sql/statements", self.host))
            .bearer_auth(self.token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(WarehouseError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Status { status: status.as_u16(), body }.into());
        }

        let payload: Value = response.json().await.map_err(WarehouseError::from)?;
        let result = parse_statement_response(&payload)?;
        debug!(
            event_name = "warehouse.statement.completed",
            columns = result.columns.len(),
            rows = result.rows.len(),
            "statement completed"
        );
        Ok(result)
    }
}

pub fn parse_statement_response(payload: &Value) -> Result<QueryResult, WarehouseError> {
    let state = payload
        .pointer("/status/state")
        .and_then(Value::as_str)
        .ok_or_else(|| WarehouseError::Malformed("missing status.state".to_string()))?;

    if state != "SUCCEEDED" {
        let message = payload
            .pointer("/status/error/message")
            .and_then(Value::as_str)
            .unwrap_or("no error message")
            .to_string();
        return Err(WarehouseError::Statement { state: state.to_string(), message });
    }

    let columns = payload
        .pointer("/manifest/schema/columns")
        .and_then(Value::as_array)
        .map(|columns| {
            columns
                .iter()
                .filter_map(|column| column.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let rows = match payload.pointer("/result/data_array") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(rows)) => rows
            .iter()
            .map(|row| match row {
                Value::Array(values) => Ok(values.clone()),
                other => Err(WarehouseError::Malformed(format!("row is not an array: {other}"))),
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(WarehouseError::Malformed(format!("data_array is not an array: {other}")))
        }
    };

    Ok(QueryResult { columns, rows })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use slacklake_core::config::WarehouseConfig;

    use super::{parse_statement_response, DatabricksSqlClient, WarehouseError};

    #[test]
    fn succeeded_statement_yields_columns_and_rows() {
        let payload = json!({
            "statement_id": "01ef",
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "kpi_metric"}, {"name": "value_week"}]}},
            "result": {"data_array": [["gmv", "1520.5"], ["gross_revenue", null]]}
        });

        let result = parse_statement_response(&payload).expect("parsed");
        assert_eq!(result.columns, vec!["kpi_metric", "value_week"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.text(&result.rows[1], "value_week"), None);
    }

    #[test]
    fn empty_result_has_no_rows() {
        let payload = json!({
            "status": {"state": "SUCCEEDED"},
            "manifest": {"schema": {"columns": [{"name": "x"}]}},
            "result": {}
        });
        let result = parse_statement_response(&payload).expect("parsed");
        assert!(result.rows.is_empty());
    }

    #[test]
    fn failed_statement_reports_message() {
        let payload = json!({
            "status": {"state": "FAILED", "error": {"message": "TABLE_OR_VIEW_NOT_FOUND"}}
        });
        let error = parse_statement_response(&payload).expect_err("should fail");
        assert!(matches!(
            error,
            WarehouseError::Statement { ref state, ref message }
                if state == "FAILED" && message.contains("NOT_FOUND")
        ));
    }

    #[test]
    fn client_requires_complete_config() {
        let config = WarehouseConfig {
            host: Some("https://adb-1.azuredatabricks.net".to_string()),
            warehouse_id: None,
            token: Some("dapi-token".to_string().into()),
            timeout_secs: 30,
        };
        assert!(matches!(
            DatabricksSqlClient::from_config(&config),
            Err(WarehouseError::Configuration(_))
        ));
    }
}
