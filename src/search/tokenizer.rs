use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Shortest token kept in the index.
pub const MIN_TOKEN_LEN: usize = 2;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("word pattern is valid"));

/// Lowercased word tokens in order of appearance, duplicates kept for term frequency.
pub fn tokenize_text(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .collect()
}

/// Splits a free-text predicate on whitespace. Every token must match.
///
/// Tokens shorter than `MIN_TOKEN_LEN` are dropped, they are never indexed.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    query
        .to_lowercase()
        .split_whitespace()
        .flat_map(|word| {
            WORD.find_iter(word)
                .map(|m| m.as_str().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|word| word.chars().count() >= MIN_TOKEN_LEN)
        .filter(|word| seen.insert(word.clone()))
        .collect()
}
