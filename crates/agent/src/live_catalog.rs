//! Runtime fallback that routes against warehouse metadata when the catalog
//! has no answer. Only a handful of tables are described per question; the
//! full catalog is never generated here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use slacklake_core::catalog::schema::{
    describe_sql, entry_from_metadata, list_tables_sql, parse_describe, parse_tables,
};
use slacklake_core::config::{CatalogTarget, LiveCatalogConfig};
use slacklake_core::routing::{normalize::is_sentinel, normalize_answer, render_options};
use slacklake_core::{CatalogEntry, RouterSettings, TableInfo};

use crate::llm::LlmClient;
use crate::prompts::router_prompt;
use crate::warehouse::WarehouseClient;

pub const TABLE_TYPES: [&str; 3] = ["MANAGED", "EXTERNAL", "VIEW"];

pub struct LiveCatalog {
    warehouse: Arc<dyn WarehouseClient>,
    targets: Vec<CatalogTarget>,
    max_tables: usize,
    max_total_chars: usize,
    max_desc_chars: usize,
    tables: Mutex<HashMap<CatalogTarget, Vec<TableInfo>>>,
    contexts: Mutex<HashMap<String, CatalogEntry>>,
}

impl LiveCatalog {
    /// `None` unless the fallback is enabled and has at least one target.
    pub fn from_config(
        warehouse: Arc<dyn WarehouseClient>,
        config: &LiveCatalogConfig,
        router: &RouterSettings,
    ) -> Option<Self> {
        config.is_active().then(|| Self {
            warehouse,
            targets: config.targets.clone(),
            max_tables: config.max_tables,
            max_total_chars: router.max_total_chars,
            max_desc_chars: router.max_desc_chars,
            tables: Mutex::new(HashMap::new()),
            contexts: Mutex::new(HashMap::new()),
        })
    }

    pub fn targets(&self) -> &[CatalogTarget] {
        &self.targets
    }

    /// Asks the model to pick one listed table and returns an entry built
    /// from its metadata. Every failure is logged and yields `None`.
    pub async fn build_live_context(
        &self,
        question: &str,
        llm: &dyn LlmClient,
    ) -> Option<CatalogEntry> {
        let tables = self.list_tables().await;
        if tables.is_empty() {
            info!(event_name = "live_catalog.no_tables", "live catalog targets listed no tables");
            return None;
        }

        let offered = tables.iter().take(self.max_tables).collect::<Vec<_>>();
        let options = offered
            .iter()
            .map(|table| (table.fqn(), table.comment.clone().unwrap_or_default()))
            .collect::<Vec<_>>();
        let options = render_options(
            options.iter().map(|(fqn, description)| (fqn.as_str(), description.as_str())),
            self.max_total_chars,
            self.max_desc_chars,
        );

        let raw = match llm.complete(&router_prompt(question, &options)).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(
                    event_name = "live_catalog.model_error",
                    error = %error,
                    "live catalog router call failed"
                );
                return None;
            }
        };

        let answer = normalize_answer(&raw);
        if is_sentinel(&answer) || !answer.contains('.') {
            info!(
                event_name = "live_catalog.no_choice",
                answer = %raw.trim(),
                "live catalog router did not pick a table"
            );
            return None;
        }

        let chosen = offered.into_iter().find(|table| table.fqn().eq_ignore_ascii_case(&answer));
        let Some(table) = chosen else {
            warn!(
                event_name = "live_catalog.unknown_table",
                answer = %answer,
                "live catalog router answered a table outside the listing"
            );
            return None;
        };

        self.describe(table).await
    }

    async fn list_tables(&self) -> Vec<TableInfo> {
        let mut tables = Vec::new();
        for target in &self.targets {
            if let Some(cached) = self.cached_tables(target) {
                tables.extend(cached);
                continue;
            }

            let sql = list_tables_sql(&target.catalog, &target.schema, None, &TABLE_TYPES);
            match self.warehouse.execute_query(&sql).await {
                Ok(result) => {
                    let listed = parse_tables(&result);
                    info!(
                        event_name = "live_catalog.target.listed",
                        target = %target,
                        tables = listed.len(),
                        "listed live catalog target"
                    );
                    if let Ok(mut cache) = self.tables.lock() {
                        cache.insert(target.clone(), listed.clone());
                    }
                    tables.extend(listed);
                }
                Err(error) => warn!(
                    event_name = "live_catalog.target.failed",
                    target = %target,
                    error = %error,
                    "could not list live catalog target"
                ),
            }
        }
        tables
    }

    fn cached_tables(&self, target: &CatalogTarget) -> Option<Vec<TableInfo>> {
        self.tables.lock().ok()?.get(target).cloned()
    }

    fn cached_context(&self, fqn: &str) -> Option<CatalogEntry> {
        self.contexts.lock().ok()?.get(fqn).cloned()
    }

    async fn describe(&self, table: &TableInfo) -> Option<CatalogEntry> {
        let fqn = table.fqn();
        if let Some(entry) = self.cached_context(&fqn) {
            return Some(entry);
        }

        let result = match self.warehouse.execute_query(&describe_sql(&fqn)).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "live_catalog.describe.failed",
                    table_fqn = %fqn,
                    error = %error,
                    "could not describe live catalog table"
                );
                return None;
            }
        };

        let columns = parse_describe(&table.table_name, &result);
        match entry_from_metadata(fqn.clone(), table, &columns) {
            Ok(entry) => {
                if let Ok(mut cache) = self.contexts.lock() {
                    cache.insert(fqn, entry.clone());
                }
                Some(entry)
            }
            Err(error) => {
                warn!(
                    event_name = "live_catalog.entry.invalid",
                    table_fqn = %fqn,
                    error = %error,
                    "live catalog metadata did not form a valid entry"
                );
                None
            }
        }
    }
}
