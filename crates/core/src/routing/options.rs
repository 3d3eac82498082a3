use crate::catalog::{truncate_chars, Catalog};

/// Renders the option list shown to the router model. Lines are dropped
/// from the end so the output never exceeds `max_total_chars` characters;
/// unknown ids are skipped.
pub fn build_options<'a, I>(
    catalog: &Catalog,
    candidate_ids: I,
    max_total_chars: usize,
    max_desc_chars: usize,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let options = candidate_ids
        .into_iter()
        .filter_map(|id| catalog.get(id))
        .map(|entry| (entry.id(), entry.display_description()));
    render_options(options, max_total_chars, max_desc_chars)
}

/// `- ID: <id> | Descrição: <desc>` lines under a total character budget.
pub fn render_options<'a, I>(options: I, max_total_chars: usize, max_desc_chars: usize) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut lines = Vec::new();
    let mut total = 0;
    for (id, description) in options {
        let line =
            format!("- ID: {id} | Descrição: {}", truncate_chars(description, max_desc_chars));
        let cost = line.chars().count() + 1;
        if total + cost > max_total_chars {
            break;
        }
        total += cost;
        lines.push(line);
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::build_options;
    use crate::catalog::{Catalog, CatalogEntryDraft};

    fn catalog() -> Catalog {
        Catalog::from_entries((0..50).map(|position| {
            CatalogEntryDraft::new(format!("tabela_{position:02}"), "Descrição ".repeat(40))
                .build()
                .expect("valid entry")
        }))
        .expect("unique ids")
    }

    #[test]
    fn prefers_short_description_and_truncates() {
        let catalog = Catalog::from_entries(vec![
            CatalogEntryDraft::new("kpi_weekly", "Descrição longa")
                .short_description("KPIs semanais")
                .build()
                .expect("valid entry"),
            CatalogEntryDraft::new("vendas", "Vendas diárias por loja e canal")
                .build()
                .expect("valid entry"),
        ])
        .expect("unique ids");

        let options = build_options(&catalog, ["kpi_weekly", "ausente", "vendas"], 4_000, 12);
        assert_eq!(
            options,
            "- ID: kpi_weekly | Descrição: KPIs semanais\n- ID: vendas | Descrição: Vendas diár…"
        );
    }

    #[test]
    fn output_stays_within_budget() {
        let catalog = catalog();
        let ids = catalog.ids().collect::<Vec<_>>();
        for budget in [0, 10, 100, 500, 4_000] {
            let options = build_options(&catalog, ids.iter().copied(), budget, 140);
            assert!(options.chars().count() <= budget, "budget {budget} exceeded");
        }
        assert!(build_options(&catalog, ids.iter().copied(), 10, 140).is_empty());
    }
}
