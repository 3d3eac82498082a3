use std::collections::BTreeSet;

pub const MIN_TOKEN_CHARS: usize = 3;

/// Portuguese function words that carry no routing signal.
pub const STOPWORDS: &[&str] = &[
    "a", "o", "os", "as", "um", "uma", "uns", "umas", "de", "da", "do", "das", "dos", "em", "no",
    "na", "nos", "nas", "e", "ou", "com", "para", "por", "sobre", "entre", "qual", "quais",
    "quanto", "quantos", "quando", "onde", "como", "porque", "me", "minha", "meu", "seu", "sua",
    "suas", "seus", "isso", "essa", "esse", "essas", "esses", "isto", "aquele", "aquela", "hoje",
    "ontem", "amanha", "amanhã",
];

/// Unique routing tokens of `text`: words split on anything that is not
/// alphanumeric or `_`, lowercased, without short words and stop-words.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|character: char| !(character.is_alphanumeric() || character == '_'))
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .filter(|word| word.chars().count() >= MIN_TOKEN_CHARS)
        .filter(|word| !is_stopword(word))
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}
