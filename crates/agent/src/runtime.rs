use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use slacklake_core::catalog::truncate_chars;
use slacklake_core::config::GenieConfig;
use slacklake_core::{CatalogEntry, DomainError, RoutingOutcome};

use crate::genie::GenieClient;
use crate::guardrails::{apply_sql_guardrails, normalize_sql};
use crate::llm::LlmClient;
use crate::prompts::{interpret_prompt, sql_prompt};
use crate::router::TableRouter;
use crate::warehouse::WarehouseClient;

pub const NOT_FOUND_MESSAGE: &str =
    "Desculpe, não encontrei uma tabela no meu catálogo que responda isso.";
pub const MODEL_UNAVAILABLE_MESSAGE: &str =
    "Não consegui consultar o modelo de linguagem agora. Tente novamente em instantes.";
pub const GENIE_UNAVAILABLE_MESSAGE: &str =
    "Não consegui consultar o Genie para essa pergunta agora. Tente novamente em instantes.";

pub const MAX_RESULT_ROWS: usize = 50;
pub const MAX_RESULT_COLUMNS: usize = 20;
pub const MAX_CELL_CHARS: usize = 300;

/// Reply for one question: the text posted to the thread and the statement
/// that produced it, when one was generated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub sql: Option<String>,
}

impl Answer {
    fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), sql: None }
    }
}

/// Question → table → SQL → warehouse → interpreted answer, or question →
/// table → Genie space when one is configured for the table.
pub struct AgentRuntime {
    router: TableRouter,
    llm: Arc<dyn LlmClient>,
    warehouse: Arc<dyn WarehouseClient>,
    genie: Option<Arc<dyn GenieClient>>,
    genie_config: GenieConfig,
}

impl AgentRuntime {
    pub fn new(router: TableRouter, warehouse: Arc<dyn WarehouseClient>) -> Self {
        let llm = router.llm().clone();
        Self { router, llm, warehouse, genie: None, genie_config: GenieConfig::default() }
    }

    pub fn with_genie(mut self, client: Arc<dyn GenieClient>, config: GenieConfig) -> Self {
        self.genie = Some(client);
        self.genie_config = config;
        self
    }

    pub fn router(&self) -> &TableRouter {
        &self.router
    }

    /// Guardrail and warehouse failures come back as user-facing text; only
    /// an empty question or a failing model call after routing is an error.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(DomainError::EmptyQuestion.into());
        }

        let entry = match self.router.identify_table(question).await {
            RoutingOutcome::Resolved { entry, source } => {
                info!(
                    event_name = "runtime.table.resolved",
                    entry_id = %entry.id(),
                    source = ?source,
                    "table resolved for question"
                );
                entry
            }
            RoutingOutcome::NotFound(reason) => {
                info!(event_name = "runtime.table.not_found", reason = ?reason, "no table found");
                return Ok(Answer::text_only(NOT_FOUND_MESSAGE));
            }
            RoutingOutcome::ModelError { detail } => {
                warn!(event_name = "runtime.router.model_error", detail = %detail, "router failed");
                return Ok(Answer::text_only(MODEL_UNAVAILABLE_MESSAGE));
            }
        };

        if let Some(genie) = &self.genie {
            if let Some(space_id) = self.genie_config.space_for(&entry) {
                return Ok(ask_genie(genie.as_ref(), space_id, &entry, question).await);
            }
        }

        let raw_sql = self.llm.complete(&sql_prompt(entry.sql_context(), question)).await?;
        let sql = match apply_sql_guardrails(&raw_sql) {
            Ok(sql) => sql,
            Err(violation) => {
                warn!(
                    event_name = "runtime.sql.blocked",
                    entry_id = %entry.id(),
                    reason_code = violation.reason_code(),
                    "generated SQL failed guardrails"
                );
                return Ok(Answer {
                    text: format!("Não consegui gerar um SQL seguro para executar: {violation}"),
                    sql: Some(normalize_sql(&raw_sql)),
                });
            }
        };

        let result = match self.warehouse.execute_query(&sql).await {
            Ok(result) => result,
            Err(error) => {
                warn!(
                    event_name = "runtime.sql.failed",
                    entry_id = %entry.id(),
                    error = %error,
                    "warehouse rejected generated SQL"
                );
                return Ok(Answer {
                    text: format!("Erro ao executar a query: {error}"),
                    sql: Some(sql),
                });
            }
        };

        info!(
            event_name = "runtime.sql.executed",
            entry_id = %entry.id(),
            rows = result.rows.len(),
            columns = result.columns.len(),
            "query executed"
        );

        let compact = compact_result(&result.columns, &result.rows);
        let text =
            self.llm.complete(&interpret_prompt(question, &result.columns, &compact)).await?;
        Ok(Answer { text, sql: Some(sql) })
    }
}

/// Genie failures never fall through to the SQL pipeline; the user gets
/// [`GENIE_UNAVAILABLE_MESSAGE`].
async fn ask_genie(
    genie: &dyn GenieClient,
    space_id: &str,
    entry: &CatalogEntry,
    question: &str,
) -> Answer {
    match genie.ask(space_id, question).await {
        Ok(reply) => {
            info!(
                event_name = "runtime.genie.answered",
                entry_id = %entry.id(),
                space_id,
                has_sql = reply.sql.is_some(),
                "genie answered question"
            );
            Answer { text: reply.text, sql: reply.sql }
        }
        Err(error) => {
            warn!(
                event_name = "runtime.genie.failed",
                entry_id = %entry.id(),
                space_id,
                error = %error,
                "genie call failed"
            );
            Answer::text_only(GENIE_UNAVAILABLE_MESSAGE)
        }
    }
}

/// JSON sample of a result sized for an interpretation prompt: at most
/// [`MAX_RESULT_ROWS`] rows of [`MAX_RESULT_COLUMNS`] columns, long text cells
/// cut to [`MAX_CELL_CHARS`], plus a `meta` block describing the cut.
pub fn compact_result(columns: &[String], rows: &[Vec<Value>]) -> String {
    let kept_columns = &columns[..columns.len().min(MAX_RESULT_COLUMNS)];
    let kept_rows = &rows[..rows.len().min(MAX_RESULT_ROWS)];

    let compact_rows = kept_rows
        .iter()
        .map(|row| {
            kept_columns
                .iter()
                .zip(row.iter())
                .map(|(column, value)| (column.clone(), compact_cell(value)))
                .collect::<Map<String, Value>>()
        })
        .map(Value::Object)
        .collect::<Vec<_>>();

    json!({
        "meta": {
            "colunas_total": columns.len(),
            "colunas_enviadas": kept_columns.len(),
            "linhas_total_retornadas": rows.len(),
            "linhas_enviadas": kept_rows.len(),
            "truncado": columns.len() > kept_columns.len() || rows.len() > kept_rows.len(),
        },
        "rows": compact_rows,
    })
    .to_string()
}

fn compact_cell(value: &Value) -> Value {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(text) => Value::String(cut_cell(text)),
        other => Value::String(cut_cell(&other.to_string())),
    }
}

fn cut_cell(text: &str) -> String {
    if text.chars().count() > MAX_CELL_CHARS {
        truncate_chars(text, MAX_CELL_CHARS)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use slacklake_core::config::GenieConfig;
    use slacklake_core::{Catalog, CatalogEntryDraft, DomainError, QueryResult, RouterSettings};

    use super::{
        compact_result, AgentRuntime, GENIE_UNAVAILABLE_MESSAGE, MAX_CELL_CHARS, NOT_FOUND_MESSAGE,
    };
    use crate::genie::{GenieClient, GenieReply};
    use crate::llm::LlmClient;
    use crate::router::TableRouter;
    use crate::warehouse::WarehouseClient;

    struct QueuedLlm {
        answers: Mutex<VecDeque<&'static str>>,
        prompts: Mutex<Vec<String>>,
    }

    impl QueuedLlm {
        fn new(answers: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmClient for QueuedLlm {
        async fn complete(&self, prompt: &str) -> Result<String> {
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            let mut answers = self.answers.lock().map_err(|_| anyhow!("poisoned"))?;
            answers.pop_front().map(str::to_string).ok_or_else(|| anyhow!("no scripted answer"))
        }
    }

    struct RecordingWarehouse {
        result: Result<QueryResult, String>,
        statements: Mutex<Vec<String>>,
    }

    impl RecordingWarehouse {
        fn returning(result: Result<QueryResult, String>) -> Arc<Self> {
            Arc::new(Self { result, statements: Mutex::new(Vec::new()) })
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().map(|statements| statements.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl WarehouseClient for RecordingWarehouse {
        async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
            if let Ok(mut statements) = self.statements.lock() {
                statements.push(sql.to_string());
            }
            self.result.clone().map_err(|message| anyhow!(message))
        }
    }

    fn runtime(llm: Arc<QueuedLlm>, warehouse: Arc<RecordingWarehouse>) -> AgentRuntime {
        let entry = CatalogEntryDraft::new("kpi_weekly", "Métricas semanais")
            .table_fqn("dev.gold.mart_kpi_weekly_core")
            .build()
            .expect("valid entry");
        let catalog = Arc::new(Catalog::from_entries(vec![entry]).expect("catalog"));
        let router = TableRouter::new(catalog, llm, RouterSettings::default());
        AgentRuntime::new(router, warehouse)
    }

    struct ScriptedGenie {
        reply: Result<GenieReply, String>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedGenie {
        fn returning(reply: Result<GenieReply, String>) -> Arc<Self> {
            Arc::new(Self { reply, calls: Mutex::new(Vec::new()) })
        }

        fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenieClient for ScriptedGenie {
        async fn ask(&self, space_id: &str, question: &str) -> Result<GenieReply> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push((space_id.to_string(), question.to_string()));
            }
            self.reply.clone().map_err(|message| anyhow!(message))
        }
    }

    fn genie_config(entry_id: &str) -> GenieConfig {
        GenieConfig {
            enabled: true,
            space_map: [(entry_id.to_string(), "space-kpi".to_string())].into_iter().collect(),
            ..GenieConfig::default()
        }
    }

    fn genie_reply() -> GenieReply {
        GenieReply {
            text: "O GMV da semana foi 1520,5.".to_string(),
            sql: Some("SELECT sum(gmv) FROM dev.gold.mart_kpi_weekly_core".to_string()),
            conversation_id: Some("conv-1".to_string()),
        }
    }

    fn kpi_rows() -> QueryResult {
        QueryResult {
            columns: vec!["kpi_metric".into(), "value_week".into()],
            rows: vec![vec![json!("gmv"), json!(1520.5)]],
        }
    }

    #[tokio::test]
    async fn answers_with_interpreted_result_and_limited_sql() {
        let llm = QueuedLlm::new(&[
            "SELECT kpi_metric, value_week FROM dev.gold.mart_kpi_weekly_core;",
            "O GMV da semana foi 1520,5.",
        ]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let runtime = runtime(llm.clone(), warehouse.clone());

        let answer = runtime.answer("qual o gmv em kpi_weekly?").await.expect("answer");

        assert_eq!(answer.text, "O GMV da semana foi 1520,5.");
        let expected_sql =
            "SELECT kpi_metric, value_week FROM dev.gold.mart_kpi_weekly_core\nLIMIT 100";
        assert_eq!(answer.sql.as_deref(), Some(expected_sql));
        assert_eq!(warehouse.statements(), vec![expected_sql.to_string()]);

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 2, "direct match skips the router prompt");
        assert!(prompts[0].contains("dev.gold.mart_kpi_weekly_core"));
        assert!(prompts[1].contains("\"linhas_enviadas\":1"));
    }

    #[tokio::test]
    async fn blocked_sql_is_reported_without_execution() {
        let llm = QueuedLlm::new(&["```sql\nDROP TABLE dev.gold.mart_kpi_weekly_core;\n```"]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let runtime = runtime(llm, warehouse.clone());

        let answer = runtime.answer("apague kpi_weekly").await.expect("answer");

        assert!(answer.text.starts_with("Não consegui gerar um SQL seguro para executar:"));
        assert_eq!(answer.sql.as_deref(), Some("DROP TABLE dev.gold.mart_kpi_weekly_core"));
        assert!(warehouse.statements().is_empty());
    }

    #[tokio::test]
    async fn warehouse_failure_becomes_answer_text() {
        let llm = QueuedLlm::new(&["SELECT 1 FROM dev.gold.mart_kpi_weekly_core LIMIT 1"]);
        let warehouse = RecordingWarehouse::returning(Err("PERMISSION_DENIED".to_string()));
        let runtime = runtime(llm, warehouse);

        let answer = runtime.answer("kpi_weekly").await.expect("answer");

        assert_eq!(answer.text, "Erro ao executar a query: PERMISSION_DENIED");
        assert!(answer.sql.is_some());
    }

    #[tokio::test]
    async fn unknown_table_gets_fixed_message() {
        let llm = QueuedLlm::new(&["NONE"]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let runtime = runtime(llm, warehouse);

        let answer = runtime.answer("qual a previsão do tempo?").await.expect("answer");

        assert_eq!(answer.text, NOT_FOUND_MESSAGE);
        assert_eq!(answer.sql, None);
    }

    #[tokio::test]
    async fn empty_question_is_a_domain_error() {
        let runtime = runtime(QueuedLlm::new(&[]), RecordingWarehouse::returning(Ok(kpi_rows())));

        let error = runtime.answer("   ").await.expect_err("empty question");
        assert_eq!(error.downcast_ref::<DomainError>(), Some(&DomainError::EmptyQuestion));
    }

    #[tokio::test]
    async fn mapped_table_is_answered_by_genie() {
        let llm = QueuedLlm::new(&[]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let genie = ScriptedGenie::returning(Ok(genie_reply()));
        let runtime = runtime(llm.clone(), warehouse.clone())
            .with_genie(genie.clone(), genie_config("kpi_weekly"));

        let answer = runtime.answer("qual o gmv em kpi_weekly?").await.expect("answer");

        assert_eq!(answer.text, "O GMV da semana foi 1520,5.");
        assert_eq!(answer.sql, genie_reply().sql);
        assert_eq!(
            genie.calls(),
            vec![("space-kpi".to_string(), "qual o gmv em kpi_weekly?".to_string())]
        );
        assert!(llm.prompts().is_empty(), "genie replaces SQL generation");
        assert!(warehouse.statements().is_empty());
    }

    #[tokio::test]
    async fn unmapped_table_keeps_sql_pipeline() {
        let llm = QueuedLlm::new(&[
            "SELECT kpi_metric, value_week FROM dev.gold.mart_kpi_weekly_core",
            "O GMV da semana foi 1520,5.",
        ]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let genie = ScriptedGenie::returning(Ok(genie_reply()));
        let runtime = runtime(llm, warehouse.clone())
            .with_genie(genie.clone(), genie_config("outra_tabela"));

        let answer = runtime.answer("qual o gmv em kpi_weekly?").await.expect("answer");

        assert_eq!(answer.text, "O GMV da semana foi 1520,5.");
        assert!(genie.calls().is_empty());
        assert_eq!(warehouse.statements().len(), 1);
    }

    #[tokio::test]
    async fn disabled_genie_keeps_sql_pipeline() {
        let llm = QueuedLlm::new(&["SELECT 1 FROM dev.gold.mart_kpi_weekly_core", "um"]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let genie = ScriptedGenie::returning(Ok(genie_reply()));
        let config = GenieConfig { enabled: false, ..genie_config("kpi_weekly") };
        let runtime = runtime(llm, warehouse.clone()).with_genie(genie.clone(), config);

        let answer = runtime.answer("kpi_weekly").await.expect("answer");

        assert_eq!(answer.text, "um");
        assert!(genie.calls().is_empty());
    }

    #[tokio::test]
    async fn genie_failure_gets_fixed_message_without_sql() {
        let llm = QueuedLlm::new(&[]);
        let warehouse = RecordingWarehouse::returning(Ok(kpi_rows()));
        let genie = ScriptedGenie::returning(Err("genie returned 503: unavailable".to_string()));
        let runtime = runtime(llm.clone(), warehouse.clone())
            .with_genie(genie.clone(), genie_config("kpi_weekly"));

        let answer = runtime.answer("kpi_weekly").await.expect("answer");

        assert_eq!(answer.text, GENIE_UNAVAILABLE_MESSAGE);
        assert_eq!(answer.sql, None);
        assert_eq!(genie.calls().len(), 1);
        assert!(llm.prompts().is_empty());
        assert!(warehouse.statements().is_empty());
    }

    #[test]
    fn compact_result_caps_rows_columns_and_cells() {
        let columns = (0..25).map(|index| format!("c{index}")).collect::<Vec<_>>();
        let long = "x".repeat(MAX_CELL_CHARS + 20);
        let rows = (0..60)
            .map(|_| {
                let mut row = vec![json!(long), json!(7), Value::Null];
                row.resize(25, json!("v"));
                row
            })
            .collect::<Vec<_>>();

        let compact: Value =
            serde_json::from_str(&compact_result(&columns, &rows)).expect("valid json");

        assert_eq!(compact["meta"]["colunas_total"], 25);
        assert_eq!(compact["meta"]["colunas_enviadas"], 20);
        assert_eq!(compact["meta"]["linhas_total_retornadas"], 60);
        assert_eq!(compact["meta"]["linhas_enviadas"], 50);
        assert_eq!(compact["meta"]["truncado"], true);

        let first = &compact["rows"][0];
        assert_eq!(first.as_object().map(|row| row.len()), Some(20));
        assert_eq!(first["c0"].as_str().map(|cell| cell.chars().count()), Some(MAX_CELL_CHARS));
        assert!(first["c0"].as_str().is_some_and(|cell| cell.ends_with('…')));
        assert_eq!(first["c1"], 7);
        assert!(first["c2"].is_null());
    }

    #[test]
    fn small_result_is_not_marked_truncated() {
        let compact: Value = serde_json::from_str(&compact_result(
            &["total".to_string()],
            &[vec![json!(42)]],
        ))
        .expect("valid json");
        assert_eq!(compact["meta"]["truncado"], false);
        assert_eq!(compact["rows"][0]["total"], 42);
    }
}
