use regex::Regex;
use serde_json::json;
use slacklake_agent::{generate_entries, DatabricksSqlClient, GenerationRequest};
use slacklake_core::catalog::definitions::curated_entries;
use slacklake_core::catalog::loader::write_generated_layer;
use slacklake_core::config::AppConfig;
use slacklake_core::{load_catalog, Catalog};

use crate::commands::{load_config, runtime, CommandResult};
use crate::GenerateArgs;

pub fn list() -> CommandResult {
    let config = match load_config("catalog list") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let catalog = match merged_catalog("catalog list", &config) {
        Ok(catalog) => catalog,
        Err(failure) => return failure,
    };

    let entries = catalog
        .iter()
        .map(|entry| {
            json!({
                "id": entry.id(),
                "origin": catalog.origin(entry.id()),
                "table_fqn": entry.table_fqn(),
            })
        })
        .collect::<Vec<_>>();

    CommandResult::success_with_data(
        "catalog list",
        format!(
            "{} catalog entries (generated layer: {})",
            catalog.len(),
            config.catalog.generated_path.display()
        ),
        Some(json!({ "entries": entries })),
    )
}

pub fn generate(args: &GenerateArgs) -> CommandResult {
    const COMMAND: &str = "catalog generate";

    let config = match load_config(COMMAND) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    if let Err(error) = config.require_warehouse() {
        return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2);
    }

    let table_regex = match args.table_regex.as_deref().map(Regex::new).transpose() {
        Ok(table_regex) => table_regex,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "invalid_argument",
                format!("--table-regex is not a valid pattern: {error}"),
                2,
            );
        }
    };
    let request = GenerationRequest {
        table_catalog: args.table_catalog.clone(),
        table_schema: args.table_schema.clone(),
        table_like: args.table_like.clone(),
        table_regex,
        id_prefix: args.id_prefix.clone(),
    };

    let warehouse = match DatabricksSqlClient::from_config(&config.warehouse) {
        Ok(warehouse) => warehouse,
        Err(error) => return CommandResult::failure(COMMAND, "warehouse", error.to_string(), 4),
    };
    let runtime = match runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let entries = match runtime.block_on(generate_entries(&warehouse, &request)) {
        Ok(entries) => entries,
        Err(error) => {
            return CommandResult::failure(COMMAND, "warehouse", format!("{error:#}"), 4);
        }
    };

    let output = args.output.clone().unwrap_or_else(|| config.catalog.generated_path.clone());
    if let Err(error) = write_generated_layer(&output, &entries) {
        return CommandResult::failure(
            COMMAND,
            "io",
            format!("failed to write {}: {error}", output.display()),
            5,
        );
    }

    CommandResult::success_with_data(
        COMMAND,
        format!("generated {} catalog entries in '{}'", entries.len(), output.display()),
        Some(json!({ "ids": entries.iter().map(|entry| entry.id()).collect::<Vec<_>>() })),
    )
}

pub(crate) fn merged_catalog(
    command: &str,
    config: &AppConfig,
) -> Result<Catalog, CommandResult> {
    let curated = curated_entries().map_err(|error| {
        let message = format!("curated catalog is invalid: {error}");
        CommandResult::failure(command, "catalog", message, 4)
    })?;
    Ok(load_catalog(curated, &config.catalog.generated_path))
}
