use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

use slacklake_agent::genie::GenieError;
use slacklake_agent::live_catalog::LiveCatalog;
use slacklake_agent::llm::LlmError;
use slacklake_agent::warehouse::WarehouseError;
use slacklake_agent::{
    AgentRuntime, DatabricksGenieClient, DatabricksSqlClient, HttpLlmClient, LlmClient,
    TableRouter, WarehouseClient,
};
use slacklake_core::catalog::definitions::curated_entries;
use slacklake_core::config::{AppConfig, ConfigError, LoadOptions};
use slacklake_core::{load_catalog, Catalog, CatalogError};
use slacklake_db::{connect, migrations, DbPool, SqlIdempotencyRepository};
use slacklake_slack::{HttpSlackClient, SignatureVerifier, SlackApiError};

use crate::events::EventsState;
use crate::worker::Worker;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<Catalog>,
    pub events: EventsState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("curated catalog is invalid: {0}")]
    Catalog(#[from] CatalogError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::Error),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Genie(#[from] GenieError),
    #[error(transparent)]
    Slack(#[from] SlackApiError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    bootstrap_with_config(AppConfig::load(options)?).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    config.require_slack()?;
    config.require_warehouse()?;
    let (Some(bot_token), Some(signing_secret)) =
        (config.slack.bot_token.clone(), config.slack.signing_secret.clone())
    else {
        return Err(ConfigError::Validation("slack credentials are required".to_string()).into());
    };

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "event ledger ready"
    );

    let catalog = Arc::new(load_catalog(curated_entries()?, &config.catalog.generated_path));
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        entries = catalog.len(),
        generated_path = %config.catalog.generated_path.display(),
        "catalog loaded"
    );

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::from_config(&config.llm, &config.warehouse)?);
    let warehouse: Arc<dyn WarehouseClient> =
        Arc::new(DatabricksSqlClient::from_config(&config.warehouse)?);
    let live = LiveCatalog::from_config(warehouse.clone(), &config.live_catalog, &config.router);
    info!(
        event_name = "system.bootstrap.live_catalog",
        correlation_id = "bootstrap",
        enabled = live.is_some(),
        "live catalog fallback configured"
    );

    let router =
        TableRouter::new(catalog.clone(), llm, config.router.clone()).with_live_catalog(live);
    let mut runtime = AgentRuntime::new(router, warehouse);
    if config.genie.enabled {
        let genie = DatabricksGenieClient::from_config(&config.warehouse, &config.genie)?;
        runtime = runtime.with_genie(Arc::new(genie), config.genie.clone());
    }
    info!(
        event_name = "system.bootstrap.genie",
        correlation_id = "bootstrap",
        enabled = config.genie.enabled,
        mapped_spaces = config.genie.space_map.len(),
        "genie delegation configured"
    );
    let events = events_state(&config, db_pool.clone(), runtime, bot_token, signing_secret)?;

    Ok(Application { config, db_pool, catalog, events })
}

fn events_state(
    config: &AppConfig,
    db_pool: DbPool,
    runtime: AgentRuntime,
    bot_token: SecretString,
    signing_secret: SecretString,
) -> Result<EventsState, BootstrapError> {
    let ledger = Arc::new(SqlIdempotencyRepository::new(db_pool));
    let slack = Arc::new(HttpSlackClient::new(bot_token)?);
    let worker = Worker::new(Arc::new(runtime), slack, ledger.clone());

    Ok(EventsState::new(
        SignatureVerifier::new(signing_secret),
        ledger,
        config.database.event_ttl_secs,
        worker,
    ))
}
