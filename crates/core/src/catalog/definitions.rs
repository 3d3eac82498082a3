//! Hand-curated catalog layer. Entries here override generated entries with
//! the same id.

use super::{CatalogEntry, CatalogEntryDraft, CatalogError};

pub fn curated_entries() -> Result<Vec<CatalogEntry>, CatalogError> {
    vec![kpi_weekly()].into_iter().map(CatalogEntryDraft::build).collect()
}

fn kpi_weekly() -> CatalogEntryDraft {
    CatalogEntryDraft::new(
        "kpi_weekly",
        "Métricas semanais da empresa: Receita, GMV, Pedidos e Clientes Únicos.",
    )
    .short_description("KPIs semanais: receita, GMV, pedidos e clientes únicos")
    .table_fqn("dev.diamond.mart_kpi_weekly_core")
    .grain("uma linha por week_start_date × kpi_metric × segment_key")
    .measure("value_week", "valor pré-calculado por métrica; snapshot, não somar entre métricas")
    .dimension("week_start_date (date): início da semana")
    .dimension(
        "kpi_metric (string): 'count_ops', 'gmv', 'gross_revenue', 'unique_customer_day'",
    )
    .dimension("segment_key (string): 'ALL' para total geral da empresa, demais são segmentos")
    .sql_rule("Para totais da empresa, use segment_key = 'ALL'.")
    .sql_rule("NUNCA use SUM() em value_week sem filtrar kpi_metric e segment_key.")
    .sql_rule("Perguntas sobre vendas ou receita geralmente se referem a 'gross_revenue'.")
    .tags(["kpi", "semanal", "receita", "gmv", "pedidos", "clientes", "vendas"])
    .synonyms(["kpis semanais", "kpi semanal", "mart_kpi_weekly_core"])
}
