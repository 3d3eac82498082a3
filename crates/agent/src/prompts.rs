//! Prompt texts sent to the language model.

pub fn router_prompt(question: &str, options: &str) -> String {
    format!(
        "Você é um especialista em arquitetura de dados.\n\
         O usuário fez a seguinte pergunta: \"{question}\"\n\n\
         Abaixo está a lista de opções disponíveis (Top-K do catálogo):\n\
         {options}\n\n\
         Sua missão:\n\
         1. Analise qual tabela tem os dados necessários para responder a pergunta.\n\
         2. Retorne APENAS o ID da tabela (ex: 'vendas_core').\n\
         3. Se nenhuma tabela for adequada, retorne \"NONE\".\n\n\
         Resposta (apenas o ID):\n"
    )
}

pub fn sql_prompt(sql_context: &str, question: &str) -> String {
    format!(
        "{sql_context}\n\n\
         Pergunta do Usuário: {question}\n\n\
         Gere apenas o código SQL (Spark SQL / Databricks Dialect) para responder a pergunta.\n\
         Regras:\n\
         1. Não use markdown (```sql).\n\
         2. Não dê explicações.\n\
         3. Se for string, use aspas simples.\n\
         4. Use LIMIT 100 se não houver agregação explicita.\n"
    )
}

pub fn interpret_prompt(question: &str, columns: &[String], compact_rows: &str) -> String {
    format!(
        "O usuário perguntou: \"{question}\"\n\n\
         O banco de dados retornou:\n\
         Colunas: {}\n\
         Dados (amostra limitada e possivelmente truncada): {compact_rows}\n\n\
         Responda a pergunta do usuário de forma natural, profissional e direta baseada APENAS nesses dados.\n\
         Se os dados estiverem vazios, diga que não encontrou registros.\n\
         Se perceber que os dados parecem ser apenas uma amostra limitada, deixe isso claro e sugira qual agregação/filtro seria melhor para uma resposta definitiva.\n",
        columns.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::{router_prompt, sql_prompt};

    #[test]
    fn router_prompt_embeds_question_and_options() {
        let prompt = router_prompt("vendas?", "- ID: kpi_weekly | Descrição: KPIs");
        assert!(prompt.contains("\"vendas?\""));
        assert!(prompt.contains("- ID: kpi_weekly"));
        assert!(prompt.contains("\"NONE\""));
    }

    #[test]
    fn sql_prompt_starts_with_context() {
        let prompt = sql_prompt("Tabela: `dev.gold.t`", "quantos pedidos?");
        assert!(prompt.starts_with("Tabela: `dev.gold.t`"));
        assert!(prompt.contains("Pergunta do Usuário: quantos pedidos?"));
    }
}
