//! Deterministic half of table routing: everything that happens before and
//! after the router model call. The model call itself lives in the agent
//! crate so this module stays synchronous and free of I/O.

pub mod direct;
pub mod normalize;
pub mod options;
pub mod scoring;
pub mod tokenize;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CatalogEntry};

pub use direct::direct_match;
pub use normalize::{normalize_answer, resolve, Resolution};
pub use options::{build_options, render_options};
pub use scoring::{candidate_window, score, LexicalIndex, ScoredEntry};
pub use tokenize::tokenize;

/// Literal the router model answers when no option fits.
pub const NONE_SENTINEL: &str = "NONE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSettings {
    pub top_k_with_signal: usize,
    pub top_k_without_signal: usize,
    pub max_total_chars: usize,
    pub max_desc_chars: usize,
    /// Whether synonyms act as direct-match triggers next to ids and FQNs.
    /// On by default, so a question naming a synonym such as `vendas` resolves
    /// without a model call. Set to `false` to let synonyms only feed the
    /// lexical score and leave the choice to the router model.
    pub direct_match_synonyms: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            top_k_with_signal: 8,
            top_k_without_signal: 20,
            max_total_chars: 4_000,
            max_desc_chars: 140,
            direct_match_synonyms: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    DirectMatch,
    Model,
    LiveCatalog,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotFoundReason {
    EmptyCatalog,
    Sentinel,
    Unresolved { raw: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutingOutcome {
    Resolved { entry: CatalogEntry, source: RouteSource },
    NotFound(NotFoundReason),
    ModelError { detail: String },
}

impl RoutingOutcome {
    pub fn entry(&self) -> Option<&CatalogEntry> {
        match self {
            Self::Resolved { entry, .. } => Some(entry),
            _ => None,
        }
    }

    pub fn into_entry(self) -> Option<CatalogEntry> {
        match self {
            Self::Resolved { entry, .. } => Some(entry),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Resolved { .. } => "resolved",
            Self::NotFound(_) => "not_found",
            Self::ModelError { .. } => "model_error",
        }
    }
}

/// What the router has to do for one question.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutePlan<'a> {
    Direct(&'a CatalogEntry),
    AskModel { candidates: Vec<ScoredEntry>, options: String },
    EmptyCatalog,
}

/// Direct match, otherwise rank the catalog and render the option window.
pub fn plan_route<'a>(
    catalog: &'a Catalog,
    index: &LexicalIndex,
    question: &str,
    settings: &RouterSettings,
) -> RoutePlan<'a> {
    if let Some(entry) = direct_match(catalog, question, settings.direct_match_synonyms) {
        return RoutePlan::Direct(entry);
    }
    if catalog.is_empty() {
        return RoutePlan::EmptyCatalog;
    }

    let ranked = index.rank(question);
    let window = candidate_window(&ranked, settings);
    let options = build_options(
        catalog,
        window.iter().map(String::as_str),
        settings.max_total_chars,
        settings.max_desc_chars,
    );
    let candidates = ranked.into_iter().take(window.len()).collect();
    RoutePlan::AskModel { candidates, options }
}

/// Maps raw model text to an outcome, using the same catalog the options
/// were rendered from.
pub fn interpret_answer(catalog: &Catalog, raw: &str) -> RoutingOutcome {
    match resolve(catalog, &normalize_answer(raw)) {
        Resolution::Sentinel => RoutingOutcome::NotFound(NotFoundReason::Sentinel),
        Resolution::Found(entry) => {
            RoutingOutcome::Resolved { entry: entry.clone(), source: RouteSource::Model }
        }
        Resolution::Unresolved => {
            RoutingOutcome::NotFound(NotFoundReason::Unresolved { raw: raw.trim().to_string() })
        }
    }
}
