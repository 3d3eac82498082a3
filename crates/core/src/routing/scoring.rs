//! Lexical pre-ranking of catalog entries against a question.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use super::tokenize::tokenize;
use super::RouterSettings;
use crate::catalog::{Catalog, CatalogEntry};

/// Token present anywhere in the entry text.
pub const RECALL_WEIGHT: u32 = 1;
/// Token equal to a tag or synonym token.
pub const EXACT_TERM_WEIGHT: u32 = 15;
/// Token contained in the entry id.
pub const ID_WEIGHT: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScoredEntry {
    pub id: String,
    pub score: u32,
}

/// Pre-tokenized view of one entry.
#[derive(Clone, Debug)]
pub struct EntryProfile {
    id: String,
    id_lower: String,
    text_tokens: BTreeSet<String>,
    term_tokens: BTreeSet<String>,
}

impl EntryProfile {
    pub fn new(entry: &CatalogEntry) -> Self {
        let terms = entry.tags().iter().chain(entry.synonyms()).map(String::as_str);
        let term_tokens = tokenize(&terms.collect::<Vec<_>>().join(" "));

        let mut text = vec![entry.id(), entry.description()];
        text.extend(entry.short_description());
        text.extend(entry.table_fqn());
        let mut text_tokens = tokenize(&text.join(" "));
        text_tokens.extend(term_tokens.iter().cloned());

        Self {
            id: entry.id().to_string(),
            id_lower: entry.id().to_lowercase(),
            text_tokens,
            term_tokens,
        }
    }

    pub fn score(&self, question_tokens: &BTreeSet<String>) -> u32 {
        question_tokens
            .iter()
            .map(|token| {
                let mut points = 0;
                if self.text_tokens.contains(token) {
                    points += RECALL_WEIGHT;
                }
                if self.term_tokens.contains(token) {
                    points += EXACT_TERM_WEIGHT;
                }
                if self.id_lower.contains(token.as_str()) {
                    points += ID_WEIGHT;
                }
                points
            })
            .sum()
    }
}

pub fn score(question: &str, entry: &CatalogEntry) -> u32 {
    EntryProfile::new(entry).score(&tokenize(question))
}

/// Profiles for every entry of a catalog, built once at startup.
#[derive(Clone, Debug, Default)]
pub struct LexicalIndex {
    profiles: Vec<EntryProfile>,
}

impl LexicalIndex {
    pub fn new(catalog: &Catalog) -> Self {
        Self { profiles: catalog.iter().map(EntryProfile::new).collect() }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Every entry, best score first, ties by id ascending.
    pub fn rank(&self, question: &str) -> Vec<ScoredEntry> {
        let question_tokens = tokenize(question);
        let mut ranked = self
            .profiles
            .iter()
            .map(|profile| ScoredEntry {
                id: profile.id.clone(),
                score: profile.score(&question_tokens),
            })
            .collect::<Vec<_>>();
        ranked.sort_by(compare_ranked);
        ranked
    }
}

fn compare_ranked(left: &ScoredEntry, right: &ScoredEntry) -> Ordering {
    right.score.cmp(&left.score).then_with(|| left.id.cmp(&right.id))
}

/// Leading ids of `ranked`; the window widens when nothing scored.
pub fn candidate_window(ranked: &[ScoredEntry], settings: &RouterSettings) -> Vec<String> {
    let best = ranked.first().map(|scored| scored.score).unwrap_or(0);
    let size = if best > 0 { settings.top_k_with_signal } else { settings.top_k_without_signal };
    ranked.iter().take(size).map(|scored| scored.id.clone()).collect()
}
