//! Table catalog: typed entries plus the merged, read-only [`Catalog`].
//!
//! An entry is assembled from a [`CatalogEntryDraft`] through
//! [`CatalogEntry::new`], which validates the draft and derives the cached
//! `router_doc` and `sql_context` strings. Entries expose read-only accessors
//! so the derived strings can never drift from their source fields.

pub mod definitions;
pub mod loader;
pub mod schema;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub use loader::{load_catalog, parse_generated_layer, read_generated_layer, write_generated_layer};

/// Hard cap for the routing summary of one entry.
pub const ROUTER_DOC_MAX_CHARS: usize = 1_000;
/// Hard cap for the SQL-generation context of one entry.
pub const SQL_CONTEXT_MAX_CHARS: usize = 6_000;

const ELLIPSIS: char = '…';

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog entry is missing required field `{field}`")]
    MissingField { field: &'static str },
    #[error("catalog entry id `{id}` must not contain whitespace")]
    InvalidId { id: String },
    #[error("catalog entry `{id}` has malformed table fqn `{fqn}` (expected catalog.schema.table)")]
    InvalidFqn { id: String, fqn: String },
    #[error("duplicate catalog entry id `{0}`")]
    DuplicateId(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    #[serde(default, alias = "agregacao")]
    pub guidance: String,
}

impl Measure {
    pub fn new(name: impl Into<String>, guidance: impl Into<String>) -> Self {
        Self { name: name.into(), guidance: guidance.into() }
    }
}

/// Raw, unvalidated entry fields as authored by hand or read from the
/// generated-catalog JSON. Portuguese field names from older generated files
/// are accepted as aliases.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntryDraft {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default, alias = "descricao_curta", skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(default, alias = "tabela_fqn", skip_serializing_if = "Option::is_none")]
    pub table_fqn: Option<String>,
    #[serde(default, alias = "grao", skip_serializing_if = "Option::is_none")]
    pub grain: Option<String>,
    #[serde(
        default,
        alias = "metricas",
        deserialize_with = "deserialize_measures",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub measures: Vec<Measure>,
    #[serde(
        default,
        alias = "dimensoes",
        alias = "colunas_importantes",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub dimensions: Vec<String>,
    #[serde(default, alias = "regras", skip_serializing_if = "Vec::is_empty")]
    pub sql_rules: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "sinonimos")]
    pub synonyms: Vec<String>,
    /// Free-form context block appended verbatim to the SQL context.
    #[serde(default, alias = "contexto", skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Genie space that answers questions routed to this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genie_space_id: Option<String>,
}

impl CatalogEntryDraft {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self { id: id.into(), description: description.into(), ..Self::default() }
    }

    pub fn short_description(mut self, value: impl Into<String>) -> Self {
        self.short_description = Some(value.into());
        self
    }

    pub fn table_fqn(mut self, value: impl Into<String>) -> Self {
        self.table_fqn = Some(value.into());
        self
    }

    pub fn grain(mut self, value: impl Into<String>) -> Self {
        self.grain = Some(value.into());
        self
    }

    pub fn measure(mut self, name: impl Into<String>, guidance: impl Into<String>) -> Self {
        self.measures.push(Measure::new(name, guidance));
        self
    }

    pub fn dimension(mut self, value: impl Into<String>) -> Self {
        self.dimensions.push(value.into());
        self
    }

    pub fn sql_rule(mut self, value: impl Into<String>) -> Self {
        self.sql_rules.push(value.into());
        self
    }

    pub fn tags<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn synonyms<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn notes(mut self, value: impl Into<String>) -> Self {
        self.notes = Some(value.into());
        self
    }

    pub fn genie_space_id(mut self, value: impl Into<String>) -> Self {
        self.genie_space_id = Some(value.into());
        self
    }

    pub fn build(self) -> Result<CatalogEntry, CatalogError> {
        CatalogEntry::new(self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    id: String,
    description: String,
    short_description: Option<String>,
    table_fqn: Option<String>,
    grain: Option<String>,
    measures: Vec<Measure>,
    dimensions: Vec<String>,
    sql_rules: Vec<String>,
    tags: BTreeSet<String>,
    synonyms: BTreeSet<String>,
    notes: Option<String>,
    genie_space_id: Option<String>,
    router_doc: String,
    sql_context: String,
}

impl CatalogEntry {
    pub fn new(draft: CatalogEntryDraft) -> Result<Self, CatalogError> {
        let id = draft.id.trim().to_string();
        if id.is_empty() {
            return Err(CatalogError::MissingField { field: "id" });
        }
        if id.chars().any(char::is_whitespace) {
            return Err(CatalogError::InvalidId { id });
        }

        let description = draft.description.trim().to_string();
        if description.is_empty() {
            return Err(CatalogError::MissingField { field: "description" });
        }

        let table_fqn = non_empty(draft.table_fqn);
        if let Some(fqn) = &table_fqn {
            if !is_well_formed_fqn(fqn) {
                return Err(CatalogError::InvalidFqn { id, fqn: fqn.clone() });
            }
        }

        let mut entry = Self {
            id,
            description,
            short_description: non_empty(draft.short_description),
            table_fqn,
            grain: non_empty(draft.grain),
            measures: draft
                .measures
                .into_iter()
                .filter(|measure| !measure.name.trim().is_empty())
                .collect(),
            dimensions: clean_list(draft.dimensions),
            sql_rules: clean_list(draft.sql_rules),
            tags: clean_set(draft.tags),
            synonyms: clean_set(draft.synonyms),
            notes: non_empty(draft.notes),
            genie_space_id: non_empty(draft.genie_space_id),
            router_doc: String::new(),
            sql_context: String::new(),
        };
        entry.router_doc = render_router_doc(&entry);
        entry.sql_context = render_sql_context(&entry);
        Ok(entry)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn short_description(&self) -> Option<&str> {
        self.short_description.as_deref()
    }

    /// Short description when present, otherwise the full description.
    pub fn display_description(&self) -> &str {
        self.short_description.as_deref().unwrap_or(&self.description)
    }

    pub fn table_fqn(&self) -> Option<&str> {
        self.table_fqn.as_deref()
    }

    pub fn grain(&self) -> Option<&str> {
        self.grain.as_deref()
    }

    pub fn measures(&self) -> &[Measure] {
        &self.measures
    }

    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    pub fn sql_rules(&self) -> &[String] {
        &self.sql_rules
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn synonyms(&self) -> &BTreeSet<String> {
        &self.synonyms
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn genie_space_id(&self) -> Option<&str> {
        self.genie_space_id.as_deref()
    }

    pub fn router_doc(&self) -> &str {
        &self.router_doc
    }

    pub fn sql_context(&self) -> &str {
        &self.sql_context
    }

    /// Source fields as a draft, so an edited copy goes back through
    /// [`CatalogEntry::new`] and gets its derived strings rebuilt.
    pub fn to_draft(&self) -> CatalogEntryDraft {
        CatalogEntryDraft {
            id: self.id.clone(),
            description: self.description.clone(),
            short_description: self.short_description.clone(),
            table_fqn: self.table_fqn.clone(),
            grain: self.grain.clone(),
            measures: self.measures.clone(),
            dimensions: self.dimensions.clone(),
            sql_rules: self.sql_rules.clone(),
            tags: self.tags.iter().cloned().collect(),
            synonyms: self.synonyms.iter().cloned().collect(),
            notes: self.notes.clone(),
            genie_space_id: self.genie_space_id.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    Generated,
    Curated,
}

/// Insertion-ordered, read-only mapping from entry id to [`CatalogEntry`].
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    origins: Vec<EntryOrigin>,
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a single-layer catalog, rejecting duplicate ids.
    pub fn from_entries(
        entries: impl IntoIterator<Item = CatalogEntry>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for entry in entries {
            if catalog.contains(entry.id()) {
                return Err(CatalogError::DuplicateId(entry.id().to_string()));
            }
            catalog.upsert(entry, EntryOrigin::Curated);
        }
        Ok(catalog)
    }

    /// Generated layer first, curated layer on top. A curated entry replaces a
    /// generated entry of the same id as a whole, keeping its position.
    pub fn merge(generated: Vec<CatalogEntry>, curated: Vec<CatalogEntry>) -> Self {
        let mut catalog = Self::new();
        for entry in generated {
            catalog.upsert(entry, EntryOrigin::Generated);
        }
        for entry in curated {
            catalog.upsert(entry, EntryOrigin::Curated);
        }
        catalog
    }

    fn upsert(&mut self, entry: CatalogEntry, origin: EntryOrigin) {
        match self.index.get(entry.id()) {
            Some(&position) => {
                self.entries[position] = entry;
                self.origins[position] = origin;
            }
            None => {
                self.index.insert(entry.id().to_string(), self.entries.len());
                self.entries.push(entry);
                self.origins.push(origin);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.index.get(id).map(|position| &self.entries[*position])
    }

    pub fn get_ignore_case(&self, id: &str) -> Option<&CatalogEntry> {
        let wanted = id.to_lowercase();
        self.entries.iter().find(|entry| entry.id().to_lowercase() == wanted)
    }

    pub fn origin(&self, id: &str) -> Option<EntryOrigin> {
        self.index.get(id).map(|position| self.origins[*position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(CatalogEntry::id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cuts `text` to at most `max_chars` characters, replacing the last kept
/// character with an ellipsis when anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut output: String = trimmed.chars().take(max_chars - 1).collect();
    output.push(ELLIPSIS);
    output
}

fn render_router_doc(entry: &CatalogEntry) -> String {
    let mut parts = vec![entry.id.clone(), entry.description.clone()];
    if let Some(short) = &entry.short_description {
        parts.push(short.clone());
    }
    if let Some(fqn) = &entry.table_fqn {
        parts.push(fqn.clone());
    }
    if !entry.tags.is_empty() {
        parts.push(format!("tags: {}", join_set(&entry.tags)));
    }
    if !entry.synonyms.is_empty() {
        parts.push(format!("sinônimos: {}", join_set(&entry.synonyms)));
    }
    truncate_chars(&parts.join(" | "), ROUTER_DOC_MAX_CHARS)
}

fn render_sql_context(entry: &CatalogEntry) -> String {
    let mut lines = Vec::new();
    match &entry.table_fqn {
        Some(fqn) => lines.push(format!("Você é um analista de dados. Tabela: `{fqn}`")),
        None => lines.push(format!("Você é um analista de dados. Contexto: {}", entry.id)),
    }
    lines.push(String::new());
    lines.push(format!("Descrição da tabela: {}", entry.description));
    if let Some(grain) = &entry.grain {
        lines.push(format!("Grão: {grain}"));
    }

    if !entry.measures.is_empty() {
        lines.push(String::new());
        lines.push("Métricas:".to_string());
        for measure in &entry.measures {
            if measure.guidance.trim().is_empty() {
                lines.push(format!("- {}", measure.name));
            } else {
                lines.push(format!("- {}: {}", measure.name, measure.guidance.trim()));
            }
        }
    }

    if !entry.dimensions.is_empty() {
        lines.push(String::new());
        lines.push("Colunas:".to_string());
        lines.extend(entry.dimensions.iter().map(|dimension| format!("- {dimension}")));
    }

    if let Some(notes) = &entry.notes {
        lines.push(String::new());
        lines.push(notes.clone());
    }

    if !entry.sql_rules.is_empty() {
        lines.push(String::new());
        lines.push("Regras:".to_string());
        for (position, rule) in entry.sql_rules.iter().enumerate() {
            lines.push(format!("{}. {rule}", position + 1));
        }
    }

    truncate_chars(&lines.join("\n"), SQL_CONTEXT_MAX_CHARS)
}

fn is_well_formed_fqn(fqn: &str) -> bool {
    let parts = fqn.split('.').collect::<Vec<_>>();
    parts.len() == 3
        && parts.iter().all(|part| !part.is_empty() && !part.chars().any(char::is_whitespace))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn clean_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn clean_set(values: Vec<String>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

fn join_set(values: &BTreeSet<String>) -> String {
    values.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeasuresRepr {
    List(Vec<Measure>),
    Map(BTreeMap<String, String>),
}

fn deserialize_measures<'de, D>(deserializer: D) -> Result<Vec<Measure>, D::Error>
where
    D: Deserializer<'de>,
{
    let measures = match Option::<MeasuresRepr>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(MeasuresRepr::List(list)) => list,
        Some(MeasuresRepr::Map(map)) => {
            map.into_iter().map(|(name, guidance)| Measure { name, guidance }).collect()
        }
    };
    Ok(measures)
}

#[cfg(test)]
mod tests {
    use super::{
        truncate_chars, Catalog, CatalogEntry, CatalogEntryDraft, CatalogError, EntryOrigin,
        SQL_CONTEXT_MAX_CHARS,
    };

    fn entry(id: &str, description: &str) -> CatalogEntry {
        CatalogEntryDraft::new(id, description).build().expect("valid entry")
    }

    #[test]
    fn constructor_rejects_missing_id_and_description() {
        assert_eq!(
            CatalogEntryDraft::new("  ", "Vendas").build(),
            Err(CatalogError::MissingField { field: "id" })
        );
        assert_eq!(
            CatalogEntryDraft::new("vendas", "").build(),
            Err(CatalogError::MissingField { field: "description" })
        );
    }

    #[test]
    fn constructor_rejects_malformed_fqn_and_whitespace_ids() {
        let result = CatalogEntryDraft::new("vendas", "Vendas").table_fqn("gold.vendas").build();
        assert!(matches!(result, Err(CatalogError::InvalidFqn { .. })));

        let result = CatalogEntryDraft::new("vendas diarias", "Vendas").build();
        assert!(matches!(result, Err(CatalogError::InvalidId { .. })));
    }

    #[test]
    fn derived_strings_reflect_source_fields() {
        let entry = CatalogEntryDraft::new("kpi_weekly", "Métricas semanais da empresa.")
            .table_fqn("dev.gold.mart_kpi_weekly_core")
            .grain("uma linha por semana e métrica")
            .measure("value_week", "snapshot, não somar")
            .dimension("week_start_date (date)")
            .sql_rule("Use segment_key = 'ALL' para totais.")
            .tags(["kpi", "semanal"])
            .synonyms(["vendas"])
            .build()
            .expect("valid entry");

        assert!(entry.router_doc().starts_with("kpi_weekly | Métricas semanais"));
        assert!(entry.router_doc().contains("sinônimos: vendas"));
        assert!(entry.sql_context().contains("`dev.gold.mart_kpi_weekly_core`"));
        assert!(entry.sql_context().contains("- value_week: snapshot, não somar"));
        assert!(entry.sql_context().contains("1. Use segment_key = 'ALL' para totais."));

        let mut draft = entry.to_draft();
        draft.grain = Some("uma linha por dia".to_string());
        let rebuilt = CatalogEntry::new(draft).expect("valid entry");
        assert!(rebuilt.sql_context().contains("Grão: uma linha por dia"));
        assert!(!rebuilt.sql_context().contains("semana e métrica"));
    }

    #[test]
    fn sql_context_is_capped() {
        let long_rule = "x".repeat(SQL_CONTEXT_MAX_CHARS * 2);
        let entry =
            CatalogEntryDraft::new("big", "Tabela grande").sql_rule(long_rule).build().expect("ok");
        assert_eq!(entry.sql_context().chars().count(), SQL_CONTEXT_MAX_CHARS);
        assert!(entry.sql_context().ends_with('…'));
    }

    #[test]
    fn merge_lets_curated_replace_generated_in_place() {
        let generated = vec![entry("a", "gerado a"), entry("shared", "gerado"), entry("b", "b")];
        let curated = vec![entry("shared", "curado"), entry("c", "curado c")];

        let catalog = Catalog::merge(generated, curated);

        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["a", "shared", "b", "c"]);
        assert_eq!(catalog.get("shared"), Some(&entry("shared", "curado")));
        assert_eq!(catalog.origin("shared"), Some(EntryOrigin::Curated));
        assert_eq!(catalog.origin("a"), Some(EntryOrigin::Generated));
    }

    #[test]
    fn case_insensitive_lookup_folds_non_ascii_ids() {
        let catalog =
            Catalog::from_entries(vec![entry("vendas_mês", "Vendas do mês")]).expect("catalog");

        assert_eq!(catalog.get_ignore_case("VENDAS_MÊS").map(CatalogEntry::id), Some("vendas_mês"));
        assert_eq!(catalog.get_ignore_case("vendas_mes"), None);
    }

    #[test]
    fn from_entries_rejects_duplicates() {
        let result = Catalog::from_entries(vec![entry("a", "um"), entry("a", "dois")]);
        assert_eq!(result.err(), Some(CatalogError::DuplicateId("a".to_string())));
    }

    #[test]
    fn truncate_chars_counts_characters_not_bytes() {
        assert_eq!(truncate_chars("Descrição", 20), "Descrição");
        assert_eq!(truncate_chars("Descrição", 5), "Desc…");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
