//! Turns the router model's free text back into a catalog key.

use super::NONE_SENTINEL;
use crate::catalog::{Catalog, CatalogEntry};

/// Answers shorter than this never take part in substring matching.
pub const MIN_FUZZY_CHARS: usize = 3;

const WRAPPERS: &[char] = &['`', '"', '\'', '*'];
const TRAILING_ARTEFACTS: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    Sentinel,
    Found(&'a CatalogEntry),
    Unresolved,
}

/// Strips an `ID:` label, quoting and markdown emphasis, keeps the first
/// whitespace-delimited token and drops trailing punctuation.
pub fn normalize_answer(raw: &str) -> String {
    let mut text = raw.trim().trim_start_matches(WRAPPERS);
    if text.get(..3).is_some_and(|label| label.eq_ignore_ascii_case("id:")) {
        text = &text[3..];
    }
    let text = text.trim_start_matches(|character: char| {
        character.is_whitespace() || WRAPPERS.contains(&character)
    });

    text.split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(WRAPPERS)
        .trim_end_matches(|character: char| {
            TRAILING_ARTEFACTS.contains(&character) || WRAPPERS.contains(&character)
        })
        .to_string()
}

pub fn is_sentinel(answer: &str) -> bool {
    answer.eq_ignore_ascii_case(NONE_SENTINEL)
}

/// Resolution order: sentinel, exact id, case-insensitive id, then the first
/// id (catalog order) that contains or is contained in the answer.
pub fn resolve<'a>(catalog: &'a Catalog, answer: &str) -> Resolution<'a> {
    if answer.is_empty() {
        return Resolution::Unresolved;
    }
    if is_sentinel(answer) {
        return Resolution::Sentinel;
    }
    if let Some(entry) = catalog.get(answer).or_else(|| catalog.get_ignore_case(answer)) {
        return Resolution::Found(entry);
    }
    if answer.chars().count() < MIN_FUZZY_CHARS {
        return Resolution::Unresolved;
    }

    let answer = answer.to_lowercase();
    catalog
        .iter()
        .find(|entry| {
            let id = entry.id().to_lowercase();
            answer.contains(id.as_str()) || id.contains(answer.as_str())
        })
        .map_or(Resolution::Unresolved, Resolution::Found)
}

#[cfg(test)]
mod tests {
    use super::{normalize_answer, resolve, Resolution};
    use crate::catalog::{Catalog, CatalogEntryDraft};

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            CatalogEntryDraft::new("kpi_weekly", "KPIs").build().expect("valid entry"),
            CatalogEntryDraft::new("Vendas_Core", "Vendas").build().expect("valid entry"),
        ])
        .expect("unique ids")
    }

    #[test]
    fn strips_labels_quotes_and_commentary() {
        assert_eq!(normalize_answer("ID: `kpi_weekly`"), "kpi_weekly");
        assert_eq!(normalize_answer("kpi_weekly  \n"), "kpi_weekly");
        assert_eq!(normalize_answer("**ID:** kpi_weekly."), "kpi_weekly");
        assert_eq!(
            normalize_answer("`kpi_weekly`\nEssa tabela tem os KPIs semanais."),
            "kpi_weekly"
        );
        assert_eq!(normalize_answer("id: \"NONE\""), "NONE");
        assert_eq!(normalize_answer("   "), "");
    }

    #[test]
    fn sentinel_is_case_insensitive() {
        let catalog = catalog();
        for raw in ["NONE", "none", "ID: None", "`NONE`."] {
            assert_eq!(resolve(&catalog, &normalize_answer(raw)), Resolution::Sentinel, "{raw}");
        }
    }

    #[test]
    fn resolves_exact_then_case_insensitive_then_substring() {
        let catalog = catalog();
        let id_of = |answer: &str| match resolve(&catalog, answer) {
            Resolution::Found(entry) => Some(entry.id().to_string()),
            _ => None,
        };

        assert_eq!(id_of("kpi_weekly").as_deref(), Some("kpi_weekly"));
        assert_eq!(id_of("vendas_core").as_deref(), Some("Vendas_Core"));
        assert_eq!(id_of("tabela_kpi_weekly_v2").as_deref(), Some("kpi_weekly"));
        assert_eq!(id_of("weekly").as_deref(), Some("kpi_weekly"));
        assert_eq!(id_of("kp"), None);
        assert_eq!(id_of("clientes"), None);
        assert_eq!(id_of(""), None);
    }
}
