use crate::catalog::{Catalog, CatalogEntry};

/// First entry, in catalog order, whose id, table FQN or (optionally) one of
/// its synonyms appears literally in the question. Case-insensitive.
pub fn direct_match<'a>(
    catalog: &'a Catalog,
    question: &str,
    include_synonyms: bool,
) -> Option<&'a CatalogEntry> {
    let question = question.to_lowercase();
    if question.trim().is_empty() {
        return None;
    }

    catalog.iter().find(|entry| {
        trigger_terms(entry, include_synonyms)
            .any(|term| !term.is_empty() && question.contains(term.as_str()))
    })
}

fn trigger_terms(
    entry: &CatalogEntry,
    include_synonyms: bool,
) -> impl Iterator<Item = String> + '_ {
    let synonyms = entry.synonyms().iter().filter(move |_| include_synonyms);
    std::iter::once(entry.id())
        .chain(entry.table_fqn())
        .chain(synonyms.map(String::as_str))
        .map(|term| term.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::direct_match;
    use crate::catalog::{Catalog, CatalogEntryDraft};

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![
            CatalogEntryDraft::new("vendas_core", "Vendas")
                .table_fqn("dev.gold.vendas_core")
                .build()
                .expect("valid entry"),
            CatalogEntryDraft::new("kpi_weekly", "KPIs")
                .table_fqn("dev.gold.mart_kpi_weekly_core")
                .synonyms(["kpis semanais"])
                .build()
                .expect("valid entry"),
        ])
        .expect("unique ids")
    }

    #[test]
    fn matches_fqn_and_id_case_insensitively() {
        let catalog = catalog();
        let hit = direct_match(&catalog, "Me dá o total de DEV.GOLD.MART_KPI_WEEKLY_CORE", true);
        assert_eq!(hit.map(|entry| entry.id()), Some("kpi_weekly"));

        let hit = direct_match(&catalog, "o que tem em vendas_core?", true);
        assert_eq!(hit.map(|entry| entry.id()), Some("vendas_core"));
    }

    #[test]
    fn synonyms_can_be_disabled() {
        let catalog = catalog();
        let question = "mostra os kpis semanais";
        assert_eq!(direct_match(&catalog, question, true).map(|entry| entry.id()), Some("kpi_weekly"));
        assert!(direct_match(&catalog, question, false).is_none());
    }

    #[test]
    fn first_entry_in_catalog_order_wins() {
        let catalog = catalog();
        let hit = direct_match(&catalog, "compare vendas_core com kpi_weekly", true);
        assert_eq!(hit.map(|entry| entry.id()), Some("vendas_core"));
        assert!(direct_match(&catalog, "   ", true).is_none());
    }
}
