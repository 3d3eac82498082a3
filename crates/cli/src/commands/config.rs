use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use slacklake_core::config::{resolve_config_path, AppConfig};
use toml::Value;

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("config") {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = resolve_config_path(None);
    let sources = Sources {
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path,
    };

    CommandResult::success("config", render(&config, &sources))
}

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys }
}

struct Sources {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

fn render(config: &AppConfig, sources: &Sources) -> String {
    let targets = config
        .live_catalog
        .targets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let genie_spaces = config
        .genie
        .space_map
        .iter()
        .map(|(entry_id, space_id)| format!("{entry_id}={space_id}"))
        .collect::<Vec<_>>()
        .join(",");

    let fields = [
        field(
            "warehouse.host",
            config.warehouse.host.clone().unwrap_or_else(unset),
            &["SLACKLAKE_WAREHOUSE_HOST", "DATABRICKS_HOST"],
        ),
        field(
            "warehouse.warehouse_id",
            config.warehouse.warehouse_id.clone().unwrap_or_else(unset),
            &["SLACKLAKE_WAREHOUSE_ID", "DATABRICKS_WAREHOUSE_ID"],
        ),
        field(
            "warehouse.token",
            redact_secret(config.warehouse.token.as_ref()),
            &["SLACKLAKE_WAREHOUSE_TOKEN", "DATABRICKS_TOKEN"],
        ),
        field(
            "slack.bot_token",
            config
                .slack
                .bot_token
                .as_ref()
                .map(|token| redact_token(token.expose_secret()))
                .unwrap_or_else(unset),
            &["SLACKLAKE_SLACK_BOT_TOKEN", "SLACK_BOT_TOKEN"],
        ),
        field(
            "slack.signing_secret",
            redact_secret(config.slack.signing_secret.as_ref()),
            &["SLACKLAKE_SLACK_SIGNING_SECRET", "SLACK_SIGNING_SECRET"],
        ),
        field("llm.provider", format!("{:?}", config.llm.provider), &["SLACKLAKE_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["SLACKLAKE_LLM_MODEL", "LLM_ENDPOINT"]),
        field(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(unset),
            &["SLACKLAKE_LLM_BASE_URL"],
        ),
        field(
            "llm.api_key",
            redact_secret(config.llm.api_key.as_ref()),
            &["SLACKLAKE_LLM_API_KEY"],
        ),
        field(
            "catalog.generated_path",
            config.catalog.generated_path.display().to_string(),
            &["SLACKLAKE_CATALOG_GENERATED_PATH", "GENERATED_CATALOG_PATH"],
        ),
        field(
            "router.top_k_with_signal",
            config.router.top_k_with_signal.to_string(),
            &["SLACKLAKE_ROUTER_TOP_K_WITH_SIGNAL"],
        ),
        field(
            "router.top_k_without_signal",
            config.router.top_k_without_signal.to_string(),
            &["SLACKLAKE_ROUTER_TOP_K_WITHOUT_SIGNAL"],
        ),
        field(
            "router.max_total_chars",
            config.router.max_total_chars.to_string(),
            &["SLACKLAKE_ROUTER_MAX_TOTAL_CHARS"],
        ),
        field(
            "router.max_desc_chars",
            config.router.max_desc_chars.to_string(),
            &["SLACKLAKE_ROUTER_MAX_DESC_CHARS"],
        ),
        field(
            "router.direct_match_synonyms",
            config.router.direct_match_synonyms.to_string(),
            &["SLACKLAKE_ROUTER_DIRECT_MATCH_SYNONYMS"],
        ),
        field(
            "live_catalog.enabled",
            config.live_catalog.enabled.to_string(),
            &["SLACKLAKE_LIVE_CATALOG_ENABLED"],
        ),
        field(
            "live_catalog.targets",
            if targets.is_empty() { unset() } else { targets },
            &["SLACKLAKE_LIVE_CATALOG_TARGETS", "LIVE_CATALOG_TARGETS"],
        ),
        field(
            "genie.enabled",
            config.genie.enabled.to_string(),
            &["SLACKLAKE_GENIE_ENABLED", "GENIE_ENABLED"],
        ),
        field(
            "genie.space_map",
            if genie_spaces.is_empty() { unset() } else { genie_spaces },
            &["SLACKLAKE_GENIE_SPACE_MAP", "GENIE_SPACE_MAP", "GENIE_BOT_SPACE_MAP"],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["SLACKLAKE_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["SLACKLAKE_SERVER_PORT"]),
        field("database.url", config.database.url.clone(), &["SLACKLAKE_DATABASE_URL"]),
        field(
            "database.event_ttl_secs",
            config.database.event_ttl_secs.to_string(),
            &["SLACKLAKE_DATABASE_EVENT_TTL_SECS"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["SLACKLAKE_LOGGING_LEVEL", "SLACKLAKE_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["SLACKLAKE_LOGGING_FORMAT", "SLACKLAKE_LOG_FORMAT"],
        ),
    ];

    let mut lines =
        vec!["effective config (source precedence: override > env > file > default):".to_string()];
    lines.extend(fields.iter().map(|field| {
        render_line(field.key, &field.value, field_source(field.key, field.env_keys, sources))
    }));
    lines.join("\n")
}

fn unset() -> String {
    "<unset>".to_string()
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], sources: &Sources) -> String {
    if let Some(env_key) = env_keys.iter().find(|env_key| env::var_os(env_key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = &sources.doc {
        if contains_path(doc, key_path) {
            let file_path = sources
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => unset(),
    }
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn token_redaction_keeps_only_the_kind_prefix() {
        assert_eq!(redact_token("xoxb-123-456"), "xoxb-***");
        assert_eq!(redact_token("plain"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc = "[router]\ntop_k_with_signal = 8\n".parse::<toml::Value>().expect("toml");
        assert!(contains_path(&doc, "router.top_k_with_signal"));
        assert!(!contains_path(&doc, "router.max_desc_chars"));
    }
}
