//! Thread message texts posted by the worker.

pub fn greeting(user: &str) -> String {
    format!("Olá <@{user}>! Como posso ajudar?")
}

pub fn processing(user: &str) -> String {
    format!("Olá <@{user}>! Estou processando sua pergunta…")
}

pub fn sql_debug(sql: &str) -> String {
    format!("*Debug SQL:* ```{sql}```")
}

pub fn failure(detail: &str) -> String {
    format!("Desculpe, ocorreu um erro ao processar sua solicitação. Detalhe: {detail}")
}
