use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Reasons a model-generated statement is refused. The display text is shown
/// to the Slack user verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardrailViolation {
    #[error("SQL vazio gerado pelo modelo.")]
    Empty,
    #[error("SQL contém múltiplas instruções (';'), o que não é permitido.")]
    MultipleStatements,
    #[error("Apenas queries SELECT/WITH são permitidas.")]
    NotReadOnly,
    #[error("SQL contém comandos potencialmente destrutivos e foi bloqueado.")]
    ForbiddenKeyword { keyword: String },
}

impl GuardrailViolation {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Empty => "sql_empty",
            Self::MultipleStatements => "sql_multiple_statements",
            Self::NotReadOnly => "sql_not_read_only",
            Self::ForbiddenKeyword { .. } => "sql_forbidden_keyword",
        }
    }
}

fn forbidden_keywords() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)\b(drop|delete|insert|update|merge|alter|create|replace|truncate|grant|revoke|call)\b",
        )
        .expect("static pattern compiles")
    })
}

fn limit_clause() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\blimit\b").expect("static pattern compiles")
    })
}

/// Strips markdown fences and a single trailing `;`.
pub fn normalize_sql(raw: &str) -> String {
    let stripped = raw.replace("```sql", "").replace("```", "");
    let trimmed = stripped.trim();
    match trimmed.strip_suffix(';') {
        Some(statement) => statement.trim().to_string(),
        None => trimmed.to_string(),
    }
}

/// Returns the statement that may be executed, with a row limit appended
/// when the model did not write one.
pub fn apply_sql_guardrails(raw: &str) -> Result<String, GuardrailViolation> {
    let sql = normalize_sql(raw);
    if sql.is_empty() {
        return Err(GuardrailViolation::Empty);
    }
    if sql.contains(';') {
        return Err(GuardrailViolation::MultipleStatements);
    }

    let lowered = sql.to_lowercase();
    if !(lowered.starts_with("select") || lowered.starts_with("with")) {
        return Err(GuardrailViolation::NotReadOnly);
    }
    if let Some(keyword) = forbidden_keywords().find(&sql) {
        return Err(GuardrailViolation::ForbiddenKeyword {
            keyword: keyword.as_str().to_lowercase(),
        });
    }

    if limit_clause().is_match(&sql) {
        Ok(sql)
    } else {
        Ok(format!("{sql}\nLIMIT {DEFAULT_ROW_LIMIT}"))
    }
}
