//! Warehouse metadata (information_schema / DESCRIBE) turned into catalog
//! entries. Used by catalog generation and by the live-catalog fallback.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CatalogEntry, CatalogEntryDraft, CatalogError};

/// Columns listed per table before the rest is dropped from the context.
pub const MAX_CONTEXT_COLUMNS: usize = 200;

pub const DEFAULT_SQL_RULES: [&str; 4] = [
    "Prefira selecionar apenas as colunas necessárias (evite SELECT *).",
    "Use filtros por período quando aplicável (ex.: datas/partições).",
    "Se não houver agregação explícita, use LIMIT 100.",
    "Ao agregar, confira o grão para evitar duplicação (JOINs podem multiplicar linhas).",
];

/// Tabular result of a warehouse statement.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.eq_ignore_ascii_case(name))
    }

    /// Text value of `column` in `row`; `None` for nulls, empty strings and
    /// unknown columns.
    pub fn text(&self, row: &[Value], column: &str) -> Option<String> {
        let index = self.column_index(column)?;
        match row.get(index)? {
            Value::Null => None,
            Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    pub table_catalog: String,
    pub table_schema: String,
    pub table_name: String,
    pub comment: Option<String>,
}

impl TableInfo {
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.table_catalog, self.table_schema, self.table_name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub table_name: String,
    pub column_name: String,
    pub data_type: Option<String>,
    pub comment: Option<String>,
    pub ordinal_position: Option<u32>,
}

impl ColumnInfo {
    pub fn render(&self) -> String {
        let mut line = self.column_name.clone();
        if let Some(data_type) = &self.data_type {
            line.push_str(&format!(" ({data_type})"));
        }
        if let Some(comment) = &self.comment {
            line.push_str(&format!(": {}", comment.trim()));
        }
        line
    }
}

pub fn describe_table(table: &TableInfo) -> String {
    match table.comment.as_deref().map(str::trim).filter(|comment| !comment.is_empty()) {
        Some(comment) => comment.to_string(),
        None => format!("Tabela `{}`.", table.fqn()),
    }
}

/// Builds an entry with the same shape as a curated one from raw metadata.
pub fn entry_from_metadata(
    id: impl Into<String>,
    table: &TableInfo,
    columns: &[ColumnInfo],
) -> Result<CatalogEntry, CatalogError> {
    let mut draft = CatalogEntryDraft::new(id, describe_table(table)).table_fqn(table.fqn());
    draft.dimensions = if columns.is_empty() {
        vec!["(sem colunas encontradas)".to_string()]
    } else {
        columns.iter().take(MAX_CONTEXT_COLUMNS).map(ColumnInfo::render).collect()
    };
    draft.sql_rules = DEFAULT_SQL_RULES.iter().map(|rule| (*rule).to_string()).collect();
    draft.build()
}

pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

pub fn list_tables_sql(
    table_catalog: &str,
    table_schema: &str,
    table_like: Option<&str>,
    table_types: &[&str],
) -> String {
    let types = table_types
        .iter()
        .map(|table_type| format!("'{}'", escape_literal(table_type)))
        .collect::<Vec<_>>()
        .join(",");
    let mut sql = format!(
        "SELECT table_catalog, table_schema, table_name, comment\n\
         FROM system.information_schema.tables\n\
         WHERE table_catalog = '{}'\n  AND table_schema = '{}'\n  AND table_type IN ({types})",
        escape_literal(table_catalog),
        escape_literal(table_schema),
    );
    if let Some(pattern) = table_like {
        sql.push_str(&format!("\n  AND table_name LIKE '{}'", escape_literal(pattern)));
    }
    sql.push_str("\nORDER BY table_name");
    sql
}

pub fn list_columns_sql(table_catalog: &str, table_schema: &str) -> String {
    format!(
        "SELECT table_name, column_name, data_type, comment, ordinal_position\n\
         FROM system.information_schema.columns\n\
         WHERE table_catalog = '{}'\n  AND table_schema = '{}'\n\
         ORDER BY table_name, ordinal_position",
        escape_literal(table_catalog),
        escape_literal(table_schema),
    )
}

pub fn describe_sql(fqn: &str) -> String {
    let quoted = fqn
        .split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".");
    format!("DESCRIBE TABLE {quoted}")
}

pub fn parse_tables(result: &QueryResult) -> Vec<TableInfo> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(TableInfo {
                table_catalog: result.text(row, "table_catalog")?,
                table_schema: result.text(row, "table_schema")?,
                table_name: result.text(row, "table_name")?,
                comment: result.text(row, "comment"),
            })
        })
        .collect()
}

pub fn parse_columns(result: &QueryResult) -> Vec<ColumnInfo> {
    result
        .rows
        .iter()
        .filter_map(|row| {
            Some(ColumnInfo {
                table_name: result.text(row, "table_name")?,
                column_name: result.text(row, "column_name")?,
                data_type: result.text(row, "data_type"),
                comment: result.text(row, "comment"),
                ordinal_position: result
                    .text(row, "ordinal_position")
                    .and_then(|position| position.parse().ok()),
            })
        })
        .collect()
}

/// Column rows of a `DESCRIBE TABLE` result. Stops at the first metadata
/// section (`# Partition Information`, `# Detailed Table Information`, ...).
pub fn parse_describe(table_name: &str, result: &QueryResult) -> Vec<ColumnInfo> {
    let mut columns = Vec::new();
    for row in &result.rows {
        let Some(column_name) = result.text(row, "col_name") else {
            break;
        };
        if column_name.starts_with('#') {
            break;
        }
        columns.push(ColumnInfo {
            table_name: table_name.to_string(),
            column_name,
            data_type: result.text(row, "data_type"),
            comment: result.text(row, "comment"),
            ordinal_position: u32::try_from(columns.len() + 1).ok(),
        });
    }
    columns
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        describe_sql, entry_from_metadata, list_tables_sql, parse_describe, parse_tables,
        QueryResult, TableInfo,
    };

    fn result(columns: &[&str], rows: Vec<serde_json::Value>) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            rows: rows
                .into_iter()
                .map(|row| row.as_array().cloned().unwrap_or_default())
                .collect(),
        }
    }

    #[test]
    fn list_tables_sql_escapes_literals() {
        let sql = list_tables_sql("dev", "gold'; DROP", Some("mart_%"), &["MANAGED", "VIEW"]);
        assert!(sql.contains("table_schema = 'gold''; DROP'"));
        assert!(sql.contains("table_type IN ('MANAGED','VIEW')"));
        assert!(sql.contains("table_name LIKE 'mart_%'"));
    }

    #[test]
    fn describe_rows_stop_at_metadata_sections() {
        let describe = result(
            &["col_name", "data_type", "comment"],
            vec![
                json!(["week_start_date", "date", "Início da semana"]),
                json!(["value_week", "double", null]),
                json!(["", "", ""]),
                json!(["# Partition Information", "", ""]),
                json!(["week_start_date", "date", null]),
            ],
        );

        let columns = parse_describe("mart_kpi", &describe);
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].render(), "week_start_date (date): Início da semana");
        assert_eq!(columns[1].ordinal_position, Some(2));
    }

    #[test]
    fn metadata_entry_uses_comment_or_fallback_description() {
        let listing = result(
            &["TABLE_CATALOG", "table_schema", "table_name", "comment"],
            vec![json!(["dev", "gold", "mart_a", "Pedidos por dia"]), json!(["dev", "gold", "mart_b", null])],
        );
        let tables = parse_tables(&listing);
        assert_eq!(tables.len(), 2);

        let with_comment = entry_from_metadata("mart_a", &tables[0], &[]).expect("valid entry");
        assert_eq!(with_comment.description(), "Pedidos por dia");
        assert!(with_comment.sql_context().contains("(sem colunas encontradas)"));

        let without_comment = entry_from_metadata(tables[1].fqn(), &tables[1], &[]).expect("valid");
        assert_eq!(without_comment.description(), "Tabela `dev.gold.mart_b`.");
        assert_eq!(without_comment.id(), "dev.gold.mart_b");
        assert!(without_comment.sql_context().contains("LIMIT 100"));
    }

    #[test]
    fn describe_sql_quotes_identifiers() {
        assert_eq!(describe_sql("dev.gold.mart_a"), "DESCRIBE TABLE `dev`.`gold`.`mart_a`");
        let table = TableInfo {
            table_catalog: "dev".to_string(),
            table_schema: "gold".to_string(),
            table_name: "t".to_string(),
            comment: None,
        };
        assert_eq!(table.fqn(), "dev.gold.t");
    }
}
