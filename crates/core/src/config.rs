use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::CatalogEntry;
use crate::routing::RouterSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub slack: SlackConfig,
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub router: RouterSettings,
    pub live_catalog: LiveCatalogConfig,
    pub genie: GenieConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct WarehouseConfig {
    pub host: Option<String>,
    pub warehouse_id: Option<String>,
    pub token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: Option<SecretString>,
    pub signing_secret: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub generated_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct LiveCatalogConfig {
    pub enabled: bool,
    pub targets: Vec<CatalogTarget>,
    pub max_tables: usize,
}

/// Delegation of routed questions to Databricks Genie spaces.
#[derive(Clone, Debug, Default)]
pub struct GenieConfig {
    pub enabled: bool,
    /// Catalog entry id to Genie space id. An entry's own `genie_space_id`
    /// takes precedence.
    pub space_map: BTreeMap<String, String>,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
    /// How long a claimed Slack event id stays claimed.
    pub event_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Databricks,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// A `catalog.schema` pair scanned by the live-catalog fallback.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct CatalogTarget {
    pub catalog: String,
    pub schema: String,
}

impl CatalogTarget {
    pub fn parse(value: &str) -> Option<Self> {
        let (catalog, schema) = value.trim().split_once('.')?;
        let (catalog, schema) = (catalog.trim(), schema.trim());
        let valid = |part: &str| {
            !part.is_empty() && !part.contains('.') && !part.chars().any(char::is_whitespace)
        };
        (valid(catalog) && valid(schema))
            .then(|| Self { catalog: catalog.to_string(), schema: schema.to_string() })
    }
}

impl std::fmt::Display for CatalogTarget {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}.{}", self.catalog, self.schema)
    }
}

/// Comma-separated `catalog.schema` list; malformed parts are dropped.
pub fn parse_targets<'a>(parts: impl IntoIterator<Item = &'a str>) -> Vec<CatalogTarget> {
    let mut targets = Vec::new();
    for target in parts.into_iter().flat_map(|part| part.split(',')).filter_map(CatalogTarget::parse)
    {
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub generated_catalog_path: Option<PathBuf>,
    pub live_catalog_enabled: Option<bool>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILE: &str = "slacklake.toml";
pub const DEFAULT_GENERATED_CATALOG_PATH: &str = "catalog/generated_catalog.json";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig {
                host: None,
                warehouse_id: None,
                token: None,
                timeout_secs: 50,
            },
            slack: SlackConfig { bot_token: None, signing_secret: None },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            catalog: CatalogConfig { generated_path: PathBuf::from(DEFAULT_GENERATED_CATALOG_PATH) },
            router: RouterSettings::default(),
            live_catalog: LiveCatalogConfig { enabled: false, targets: Vec::new(), max_tables: 50 },
            genie: GenieConfig {
                enabled: false,
                space_map: BTreeMap::new(),
                poll_interval_ms: 1_000,
                timeout_secs: 120,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            database: DatabaseConfig {
                url: "sqlite://slacklake.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
                event_ttl_secs: 6 * 60 * 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "databricks" => Ok(Self::Databricks),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|databricks|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WarehouseConfig {
    pub fn is_configured(&self) -> bool {
        self.host.is_some() && self.warehouse_id.is_some() && self.token.is_some()
    }
}

impl LiveCatalogConfig {
    /// Enabled and pointed at at least one target.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.targets.is_empty()
    }
}

impl GenieConfig {
    /// Space that answers questions routed to `entry`, if Genie is enabled
    /// and one is configured for it.
    pub fn space_for<'a>(&'a self, entry: &'a CatalogEntry) -> Option<&'a str> {
        if !self.enabled {
            return None;
        }
        entry.genie_space_id().or_else(|| {
            self.space_map.get(entry.id()).map(String::as_str).filter(|id| !id.trim().is_empty())
        })
    }
}

/// JSON object of `{"<entry id>": "<space id>"}`. Non-string values and
/// blank ids are skipped.
pub fn parse_space_map(raw: &str) -> Option<BTreeMap<String, String>> {
    let object: BTreeMap<String, Value> = serde_json::from_str(raw).ok()?;
    Some(
        object
            .into_iter()
            .filter_map(|(entry_id, space_id)| {
                let space_id = space_id.as_str()?.trim().to_string();
                (!entry_id.trim().is_empty() && !space_id.is_empty())
                    .then(|| (entry_id.trim().to_string(), space_id))
            })
            .collect(),
    )
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(warehouse) = patch.warehouse {
            if let Some(host) = warehouse.host {
                self.warehouse.host = non_blank(host);
            }
            if let Some(warehouse_id) = warehouse.warehouse_id {
                self.warehouse.warehouse_id = non_blank(warehouse_id);
            }
            if let Some(warehouse_token_value) = warehouse.token {
                self.warehouse.token = non_blank(warehouse_token_value).map(secret_value);
            }
            if let Some(timeout_secs) = warehouse.timeout_secs {
                self.warehouse.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(slack_bot_token_value) = slack.bot_token {
                self.slack.bot_token = non_blank(slack_bot_token_value).map(secret_value);
            }
            if let Some(slack_signing_secret_value) = slack.signing_secret {
                self.slack.signing_secret =
                    non_blank(slack_signing_secret_value).map(secret_value);
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = non_blank(llm_api_key_value).map(secret_value);
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = non_blank(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(generated_path) = catalog.generated_path {
                self.catalog.generated_path = generated_path;
            }
        }

        if let Some(router) = patch.router {
            if let Some(top_k) = router.top_k_with_signal {
                self.router.top_k_with_signal = top_k;
            }
            if let Some(top_k) = router.top_k_without_signal {
                self.router.top_k_without_signal = top_k;
            }
            if let Some(max_total_chars) = router.max_total_chars {
                self.router.max_total_chars = max_total_chars;
            }
            if let Some(max_desc_chars) = router.max_desc_chars {
                self.router.max_desc_chars = max_desc_chars;
            }
            if let Some(direct_match_synonyms) = router.direct_match_synonyms {
                self.router.direct_match_synonyms = direct_match_synonyms;
            }
        }

        if let Some(live_catalog) = patch.live_catalog {
            if let Some(enabled) = live_catalog.enabled {
                self.live_catalog.enabled = enabled;
            }
            if let Some(targets) = live_catalog.targets {
                self.live_catalog.targets = parse_targets(targets.iter().map(String::as_str));
            }
            if let Some(max_tables) = live_catalog.max_tables {
                self.live_catalog.max_tables = max_tables;
            }
        }

        if let Some(genie) = patch.genie {
            if let Some(enabled) = genie.enabled {
                self.genie.enabled = enabled;
            }
            if let Some(space_map) = genie.space_map {
                self.genie.space_map = space_map
                    .into_iter()
                    .filter(|(entry_id, space_id)| {
                        !entry_id.trim().is_empty() && !space_id.trim().is_empty()
                    })
                    .collect();
            }
            if let Some(poll_interval_ms) = genie.poll_interval_ms {
                self.genie.poll_interval_ms = poll_interval_ms;
            }
            if let Some(timeout_secs) = genie.timeout_secs {
                self.genie.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
            if let Some(event_ttl_secs) = database.event_ttl_secs {
                self.database.event_ttl_secs = event_ttl_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        let host = read_env("SLACKLAKE_WAREHOUSE_HOST").or_else(|| read_env("DATABRICKS_HOST"));
        if let Some(value) = host {
            self.warehouse.host = Some(value);
        }
        let warehouse_id = read_env("SLACKLAKE_WAREHOUSE_ID")
            .or_else(|| read_env("DATABRICKS_WAREHOUSE_ID"));
        if let Some(value) = warehouse_id {
            self.warehouse.warehouse_id = Some(value);
        }
        let token = read_env("SLACKLAKE_WAREHOUSE_TOKEN").or_else(|| read_env("DATABRICKS_TOKEN"));
        if let Some(value) = token {
            self.warehouse.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SLACKLAKE_WAREHOUSE_TIMEOUT_SECS") {
            self.warehouse.timeout_secs = parse_u64("SLACKLAKE_WAREHOUSE_TIMEOUT_SECS", &value)?;
        }

        let bot_token =
            read_env("SLACKLAKE_SLACK_BOT_TOKEN").or_else(|| read_env("SLACK_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.slack.bot_token = Some(secret_value(value));
        }
        let signing_secret = read_env("SLACKLAKE_SLACK_SIGNING_SECRET")
            .or_else(|| read_env("SLACK_SIGNING_SECRET"));
        if let Some(value) = signing_secret {
            self.slack.signing_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("SLACKLAKE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SLACKLAKE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SLACKLAKE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        let model = read_env("SLACKLAKE_LLM_MODEL").or_else(|| read_env("LLM_ENDPOINT"));
        if let Some(value) = model {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SLACKLAKE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SLACKLAKE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("SLACKLAKE_LLM_MAX_RETRIES", &value)?;
        }

        let generated_path = read_env("SLACKLAKE_CATALOG_GENERATED_PATH")
            .or_else(|| read_env("GENERATED_CATALOG_PATH"));
        if let Some(value) = generated_path {
            self.catalog.generated_path = PathBuf::from(value);
        }

        if let Some(value) = read_env("SLACKLAKE_ROUTER_TOP_K_WITH_SIGNAL") {
            self.router.top_k_with_signal =
                parse_usize("SLACKLAKE_ROUTER_TOP_K_WITH_SIGNAL", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_ROUTER_TOP_K_WITHOUT_SIGNAL") {
            self.router.top_k_without_signal =
                parse_usize("SLACKLAKE_ROUTER_TOP_K_WITHOUT_SIGNAL", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_ROUTER_MAX_TOTAL_CHARS") {
            self.router.max_total_chars = parse_usize("SLACKLAKE_ROUTER_MAX_TOTAL_CHARS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_ROUTER_MAX_DESC_CHARS") {
            self.router.max_desc_chars = parse_usize("SLACKLAKE_ROUTER_MAX_DESC_CHARS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_ROUTER_DIRECT_MATCH_SYNONYMS") {
            self.router.direct_match_synonyms =
                parse_bool("SLACKLAKE_ROUTER_DIRECT_MATCH_SYNONYMS", &value)?;
        }

        // Legacy live-catalog variables are lenient: bad values fall back to
        // the current setting instead of failing startup.
        if let Some(value) = read_env("SLACKLAKE_LIVE_CATALOG_ENABLED") {
            self.live_catalog.enabled = parse_bool("SLACKLAKE_LIVE_CATALOG_ENABLED", &value)?;
        } else if let Some(value) = read_env("LIVE_CATALOG_ENABLED") {
            self.live_catalog.enabled = parse_flag(&value).unwrap_or(self.live_catalog.enabled);
        }
        let targets =
            read_env("SLACKLAKE_LIVE_CATALOG_TARGETS").or_else(|| read_env("LIVE_CATALOG_TARGETS"));
        if let Some(value) = targets {
            self.live_catalog.targets = parse_targets([value.as_str()]);
        }
        if let Some(value) = read_env("SLACKLAKE_LIVE_CATALOG_MAX_TABLES") {
            self.live_catalog.max_tables =
                parse_usize("SLACKLAKE_LIVE_CATALOG_MAX_TABLES", &value)?;
        } else if let Some(value) = read_env("LIVE_CATALOG_MAX_TABLES") {
            self.live_catalog.max_tables =
                value.trim().parse().unwrap_or(self.live_catalog.max_tables);
        }

        if let Some(value) = read_env("SLACKLAKE_GENIE_ENABLED") {
            self.genie.enabled = parse_bool("SLACKLAKE_GENIE_ENABLED", &value)?;
        } else if let Some(value) = read_env("GENIE_ENABLED") {
            self.genie.enabled = parse_flag(&value).unwrap_or(self.genie.enabled);
        }
        if let Some(value) = read_env("SLACKLAKE_GENIE_SPACE_MAP") {
            self.genie.space_map = parse_space_map(&value).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "SLACKLAKE_GENIE_SPACE_MAP".to_string(),
                    value: value.clone(),
                }
            })?;
        } else if let Some(value) =
            read_env("GENIE_SPACE_MAP").or_else(|| read_env("GENIE_BOT_SPACE_MAP"))
        {
            if let Some(space_map) = parse_space_map(&value) {
                self.genie.space_map = space_map;
            }
        }
        if let Some(value) = read_env("SLACKLAKE_GENIE_POLL_INTERVAL_MS") {
            self.genie.poll_interval_ms = parse_u64("SLACKLAKE_GENIE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_GENIE_TIMEOUT_SECS") {
            self.genie.timeout_secs = parse_u64("SLACKLAKE_GENIE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SLACKLAKE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SLACKLAKE_SERVER_PORT") {
            self.server.port = parse_u16("SLACKLAKE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("SLACKLAKE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SLACKLAKE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SLACKLAKE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("SLACKLAKE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("SLACKLAKE_DATABASE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("SLACKLAKE_DATABASE_EVENT_TTL_SECS") {
            self.database.event_ttl_secs = parse_u64("SLACKLAKE_DATABASE_EVENT_TTL_SECS", &value)?;
        }

        let log_level =
            read_env("SLACKLAKE_LOGGING_LEVEL").or_else(|| read_env("SLACKLAKE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SLACKLAKE_LOGGING_FORMAT").or_else(|| read_env("SLACKLAKE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(generated_catalog_path) = overrides.generated_catalog_path {
            self.catalog.generated_path = generated_catalog_path;
        }
        if let Some(enabled) = overrides.live_catalog_enabled {
            self.live_catalog.enabled = enabled;
        }
        if let Some(slack_bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = Some(secret_value(slack_bot_token));
        }
        if let Some(slack_signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = Some(secret_value(slack_signing_secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_warehouse(&self.warehouse)?;
        validate_slack(&self.slack)?;
        validate_llm(&self.llm, &self.warehouse)?;
        validate_router(&self.router)?;
        validate_live_catalog(&self.live_catalog)?;
        validate_genie(&self.genie)?;
        validate_server(&self.server)?;
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        Ok(())
    }

    /// Checks the settings the Slack event server cannot start without.
    pub fn require_slack(&self) -> Result<(), ConfigError> {
        if self.slack.bot_token.is_none() {
            return Err(ConfigError::Validation(
                "slack.bot_token is required to serve Slack events. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string(),
            ));
        }
        if self.slack.signing_secret.is_none() {
            return Err(ConfigError::Validation(
                "slack.signing_secret is required to serve Slack events. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks the settings any warehouse call needs.
    pub fn require_warehouse(&self) -> Result<(), ConfigError> {
        if self.warehouse.is_configured() {
            Ok(())
        } else {
            Err(ConfigError::Validation(
                "warehouse.host, warehouse.warehouse_id and warehouse.token are required for warehouse access".to_string(),
            ))
        }
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_warehouse(warehouse: &WarehouseConfig) -> Result<(), ConfigError> {
    if let Some(host) = &warehouse.host {
        if !host.starts_with("https://") && !host.starts_with("http://") {
            return Err(ConfigError::Validation(
                "warehouse.host must start with https:// or http://".to_string(),
            ));
        }
    }

    if warehouse.timeout_secs < 5 || warehouse.timeout_secs > 50 {
        return Err(ConfigError::Validation(
            "warehouse.timeout_secs must be in range 5..=50".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    if let Some(bot_token) = &slack.bot_token {
        let bot_token = bot_token.expose_secret();
        if !bot_token.starts_with("xoxb-") {
            let hint = if bot_token.starts_with("xapp-") {
                " (hint: you may have used the app-level token instead of the bot token)"
            } else {
                ""
            };
            return Err(ConfigError::Validation(format!(
                "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
            )));
        }
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig, warehouse: &WarehouseConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Databricks => {
            if llm.base_url.is_none() && warehouse.host.is_none() {
                return Err(ConfigError::Validation(
                    "llm.base_url or warehouse.host is required for the databricks provider"
                        .to_string(),
                ));
            }
            if llm.api_key.is_none() && warehouse.token.is_none() {
                return Err(ConfigError::Validation(
                    "llm.api_key or warehouse.token is required for the databricks provider"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_router(router: &RouterSettings) -> Result<(), ConfigError> {
    if router.top_k_with_signal == 0 || router.top_k_without_signal == 0 {
        return Err(ConfigError::Validation(
            "router.top_k_with_signal and router.top_k_without_signal must be greater than zero"
                .to_string(),
        ));
    }
    if router.max_desc_chars == 0 || router.max_total_chars < router.max_desc_chars {
        return Err(ConfigError::Validation(
            "router.max_desc_chars must be greater than zero and not exceed router.max_total_chars"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_live_catalog(live_catalog: &LiveCatalogConfig) -> Result<(), ConfigError> {
    if live_catalog.max_tables == 0 {
        return Err(ConfigError::Validation(
            "live_catalog.max_tables must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_genie(genie: &GenieConfig) -> Result<(), ConfigError> {
    if genie.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "genie.poll_interval_ms must be greater than zero".to_string(),
        ));
    }
    if genie.timeout_secs == 0 || genie.timeout_secs > 1_200 {
        return Err(ConfigError::Validation(
            "genie.timeout_secs must be in range 1..=1200".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if database.event_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "database.event_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn non_blank(value: String) -> Option<String> {
    Some(value).filter(|value| !value.trim().is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_flag(value).ok_or_else(|| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    warehouse: Option<WarehousePatch>,
    slack: Option<SlackPatch>,
    llm: Option<LlmPatch>,
    catalog: Option<CatalogPatch>,
    router: Option<RouterPatch>,
    live_catalog: Option<LiveCatalogPatch>,
    genie: Option<GeniePatch>,
    server: Option<ServerPatch>,
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct WarehousePatch {
    host: Option<String>,
    warehouse_id: Option<String>,
    token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    generated_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    top_k_with_signal: Option<usize>,
    top_k_without_signal: Option<usize>,
    max_total_chars: Option<usize>,
    max_desc_chars: Option<usize>,
    direct_match_synonyms: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LiveCatalogPatch {
    enabled: Option<bool>,
    targets: Option<Vec<String>>,
    max_tables: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct GeniePatch {
    enabled: Option<bool>,
    space_map: Option<BTreeMap<String, String>>,
    poll_interval_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
    event_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
