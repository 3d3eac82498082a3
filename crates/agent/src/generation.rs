//! Deterministic generation of the generated catalog layer from warehouse
//! metadata. One `information_schema` listing for tables and one for columns
//! per run; nothing is sent to the model.

use std::collections::HashMap;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::info;

use slacklake_core::catalog::schema::{
    entry_from_metadata, list_columns_sql, list_tables_sql, parse_columns, parse_tables,
};
use slacklake_core::{CatalogEntry, ColumnInfo};

use crate::warehouse::WarehouseClient;

pub const GENERATED_TABLE_TYPES: [&str; 3] = ["BASE TABLE", "MANAGED", "EXTERNAL"];

#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub table_catalog: String,
    pub table_schema: String,
    /// SQL `LIKE` pattern applied by the warehouse.
    pub table_like: String,
    /// Extra filter applied locally to table names.
    pub table_regex: Option<Regex>,
    pub id_prefix: Option<String>,
}

impl GenerationRequest {
    pub fn new(table_catalog: impl Into<String>, table_schema: impl Into<String>) -> Self {
        Self {
            table_catalog: table_catalog.into(),
            table_schema: table_schema.into(),
            table_like: "%".to_string(),
            table_regex: None,
            id_prefix: None,
        }
    }

    fn entry_id(&self, table_name: &str) -> String {
        match &self.id_prefix {
            Some(prefix) => format!("{prefix}{table_name}"),
            None => table_name.to_string(),
        }
    }
}

/// Builds one entry per listed table, ordered by table name.
pub async fn generate_entries(
    warehouse: &dyn WarehouseClient,
    request: &GenerationRequest,
) -> Result<Vec<CatalogEntry>> {
    let tables_sql = list_tables_sql(
        &request.table_catalog,
        &request.table_schema,
        Some(&request.table_like),
        &GENERATED_TABLE_TYPES,
    );
    let tables = parse_tables(
        &warehouse.execute_query(&tables_sql).await.context("listing warehouse tables")?,
    );

    let columns_sql = list_columns_sql(&request.table_catalog, &request.table_schema);
    let columns = parse_columns(
        &warehouse.execute_query(&columns_sql).await.context("listing warehouse columns")?,
    );
    let mut columns_by_table: HashMap<String, Vec<ColumnInfo>> = HashMap::new();
    for column in columns {
        columns_by_table.entry(column.table_name.clone()).or_default().push(column);
    }

    let mut entries = Vec::new();
    for table in &tables {
        if let Some(pattern) = &request.table_regex {
            if !pattern.is_match(&table.table_name) {
                continue;
            }
        }
        let table_columns =
            columns_by_table.get(&table.table_name).map(Vec::as_slice).unwrap_or_default();
        let entry = entry_from_metadata(request.entry_id(&table.table_name), table, table_columns)
            .with_context(|| format!("building catalog entry for {}", table.fqn()))?;
        entries.push(entry);
    }

    info!(
        event_name = "catalog.generate.completed",
        listed_tables = tables.len(),
        generated_entries = entries.len(),
        "generated catalog entries from warehouse metadata"
    );
    Ok(entries)
}
