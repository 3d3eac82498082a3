use std::sync::Arc;

use serde_json::{json, Value};
use slacklake_agent::live_catalog::LiveCatalog;
use slacklake_agent::{DatabricksSqlClient, HttpLlmClient, TableRouter, WarehouseClient};
use slacklake_core::config::AppConfig;
use slacklake_core::RoutingOutcome;

use crate::commands::catalog::merged_catalog;
use crate::commands::{load_config, runtime, CommandResult};

pub fn run(question: &str) -> CommandResult {
    const COMMAND: &str = "route";

    if question.trim().is_empty() {
        return CommandResult::failure(COMMAND, "invalid_argument", "question must not be empty", 2);
    }
    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let catalog = match merged_catalog(COMMAND, &config) {
        Ok(catalog) => Arc::new(catalog),
        Err(failure) => return failure,
    };
    let llm = match HttpLlmClient::from_config(&config.llm, &config.warehouse) {
        Ok(llm) => Arc::new(llm),
        Err(error) => return CommandResult::failure(COMMAND, "llm", error.to_string(), 4),
    };

    let router = TableRouter::new(catalog, llm, config.router.clone())
        .with_live_catalog(live_catalog(&config));
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let outcome = runtime.block_on(router.identify_table(question));

    match &outcome {
        RoutingOutcome::ModelError { detail } => CommandResult::failure(
            COMMAND,
            "model_error",
            format!("router model call failed: {detail}"),
            6,
        ),
        _ => CommandResult::success_with_data(
            COMMAND,
            outcome.label(),
            Some(outcome_payload(question, &outcome)),
        ),
    }
}

/// The fallback only runs when it is enabled and the warehouse is reachable.
fn live_catalog(config: &AppConfig) -> Option<LiveCatalog> {
    if !config.warehouse.is_configured() {
        return None;
    }
    let warehouse: Arc<dyn WarehouseClient> =
        Arc::new(DatabricksSqlClient::from_config(&config.warehouse).ok()?);
    LiveCatalog::from_config(warehouse, &config.live_catalog, &config.router)
}

fn outcome_payload(question: &str, outcome: &RoutingOutcome) -> Value {
    match outcome {
        RoutingOutcome::Resolved { entry, source } => json!({
            "question": question,
            "outcome": outcome.label(),
            "source": source,
            "entry_id": entry.id(),
            "table_fqn": entry.table_fqn(),
        }),
        RoutingOutcome::NotFound(reason) => json!({
            "question": question,
            "outcome": outcome.label(),
            "not_found": reason,
        }),
        RoutingOutcome::ModelError { detail } => json!({
            "question": question,
            "outcome": outcome.label(),
            "detail": detail,
        }),
    }
}
