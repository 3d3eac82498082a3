use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use super::{Catalog, CatalogEntry, CatalogEntryDraft};

/// Merges the generated layer stored at `generated_path` under the curated
/// entries. A missing or unusable generated file yields an empty layer.
pub fn load_catalog(curated: Vec<CatalogEntry>, generated_path: &Path) -> Catalog {
    let generated = read_generated_layer(generated_path);
    let generated_count = generated.len();
    let curated_count = curated.len();
    let catalog = Catalog::merge(generated, curated);

    info!(
        event_name = "catalog.load.completed",
        generated_path = %generated_path.display(),
        generated_entries = generated_count,
        curated_entries = curated_count,
        merged_entries = catalog.len(),
        "catalog loaded"
    );
    catalog
}

pub fn read_generated_layer(path: &Path) -> Vec<CatalogEntry> {
    match fs::read_to_string(path) {
        Ok(raw) => parse_generated_layer(&raw),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            info!(
                event_name = "catalog.generated.missing",
                path = %path.display(),
                "generated catalog file not found; using curated entries only"
            );
            Vec::new()
        }
        Err(error) => {
            warn!(
                event_name = "catalog.generated.unreadable",
                path = %path.display(),
                error = %error,
                "generated catalog file could not be read; ignoring it"
            );
            Vec::new()
        }
    }
}

/// Parses a generated-catalog document: a top-level JSON object mapping
/// entry id to entry fields. The object key is authoritative for the id.
pub fn parse_generated_layer(raw: &str) -> Vec<CatalogEntry> {
    let document = match serde_json::from_str::<Value>(raw) {
        Ok(document) => document,
        Err(error) => {
            warn!(
                event_name = "catalog.generated.invalid_json",
                error = %error,
                "generated catalog is not valid JSON; ignoring it"
            );
            return Vec::new();
        }
    };

    let Value::Object(records) = document else {
        warn!(
            event_name = "catalog.generated.not_an_object",
            "generated catalog must be a JSON object keyed by entry id; ignoring it"
        );
        return Vec::new();
    };

    let mut entries = Vec::with_capacity(records.len());
    for (id, record) in records {
        let mut draft = match serde_json::from_value::<CatalogEntryDraft>(record) {
            Ok(draft) => draft,
            Err(error) => {
                warn!(
                    event_name = "catalog.generated.entry_skipped",
                    entry_id = %id,
                    error = %error,
                    "generated catalog entry has an unexpected shape"
                );
                continue;
            }
        };
        draft.id = id.clone();

        match CatalogEntry::new(draft) {
            Ok(entry) => entries.push(entry),
            Err(error) => warn!(
                event_name = "catalog.generated.entry_skipped",
                entry_id = %id,
                error = %error,
                "generated catalog entry failed validation"
            ),
        }
    }
    entries
}

/// Writes entries as a pretty-printed JSON object with keys sorted by id.
pub fn write_generated_layer(path: &Path, entries: &[CatalogEntry]) -> io::Result<()> {
    let document = entries
        .iter()
        .map(|entry| (entry.id().to_string(), entry.to_draft()))
        .collect::<BTreeMap<_, _>>();
    let payload = serde_json::to_string_pretty(&document)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, payload + "\n")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{load_catalog, parse_generated_layer, read_generated_layer, write_generated_layer};
    use crate::catalog::{CatalogEntryDraft, EntryOrigin};

    #[test]
    fn non_object_documents_are_discarded() {
        assert!(parse_generated_layer("[1, 2, 3]").is_empty());
        assert!(parse_generated_layer("\"texto\"").is_empty());
        assert!(parse_generated_layer("{ not json").is_empty());
    }

    #[test]
    fn legacy_portuguese_fields_are_accepted() {
        let entries = parse_generated_layer(
            r#"{
                "mart_vendas": {
                    "descricao": "Vendas diárias por loja.",
                    "tabela_fqn": "dev.gold.mart_vendas",
                    "sinonimos": ["faturamento"],
                    "metricas": {"valor_total": "aditiva, SUM"},
                    "contexto": "Use sempre a coluna data_venda para filtros."
                },
                "quebrada": {"tags": ["sem descricao"]}
            }"#,
        );

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.id(), "mart_vendas");
        assert_eq!(entry.table_fqn(), Some("dev.gold.mart_vendas"));
        assert!(entry.synonyms().contains("faturamento"));
        assert_eq!(entry.measures()[0].guidance, "aditiva, SUM");
        assert!(entry.sql_context().contains("Use sempre a coluna data_venda"));
    }

    #[test]
    fn missing_file_yields_curated_only_catalog() {
        let dir = TempDir::new().expect("temp dir");
        let curated = vec![CatalogEntryDraft::new("kpi_weekly", "KPIs").build().expect("valid")];

        let catalog = load_catalog(curated, &dir.path().join("absent.json"));

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.origin("kpi_weekly"), Some(EntryOrigin::Curated));
    }

    #[test]
    fn curated_entry_wins_over_generated_entry_entirely() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("generated.json");
        fs::write(
            &path,
            r#"{"kpi_weekly": {"descricao": "gerado", "tags": ["gerado"], "grao": "dia"},
                "outra": {"descricao": "outra tabela"}}"#,
        )
        .expect("write generated");

        let curated = CatalogEntryDraft::new("kpi_weekly", "curado").build().expect("valid");
        let catalog = load_catalog(vec![curated.clone()], &path);

        assert_eq!(catalog.get("kpi_weekly"), Some(&curated));
        assert!(catalog.get("kpi_weekly").map(|entry| entry.tags().is_empty()).unwrap_or(false));
        assert_eq!(catalog.get("kpi_weekly").and_then(|entry| entry.grain()), None);
        assert_eq!(catalog.origin("outra"), Some(EntryOrigin::Generated));
    }

    #[test]
    fn written_layer_reads_back() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("nested").join("generated.json");
        let entries = vec![
            CatalogEntryDraft::new("b_table", "Tabela B")
                .table_fqn("dev.gold.b_table")
                .dimension("id (bigint)")
                .build()
                .expect("valid"),
            CatalogEntryDraft::new("a_table", "Tabela A").build().expect("valid"),
        ];

        write_generated_layer(&path, &entries).expect("write layer");
        let raw = fs::read_to_string(&path).expect("read back");
        assert!(raw.find("a_table") < raw.find("b_table"), "keys should be sorted");

        let loaded = read_generated_layer(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1], entries[0]);
    }
}
