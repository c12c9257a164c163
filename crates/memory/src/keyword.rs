//! Keyword relevance scoring shared by the in-process memory store and
//! document index.
//!
//! Score = fraction of distinct query terms that appear in the text, in
//! [0, 1]. Ties keep insertion order, so identical state always yields the
//! same ranking.

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "for", "from", "how", "i", "in", "is",
    "it", "me", "my", "of", "on", "or", "the", "to", "was", "what", "with", "you",
];

/// Lowercased alphanumeric terms, stopwords removed.
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Relevance of `text` for the pre-tokenized query.
pub fn score(query_terms: &HashSet<String>, text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let hits = query_terms
        .iter()
        .filter(|t| text_terms.contains(*t))
        .count();
    hits as f32 / query_terms.len() as f32
}

/// Sort scored items best-first, keeping insertion order among equals, then
/// keep at most `limit`.
pub fn rank<T>(mut scored: Vec<(f32, T)>, limit: usize) -> Vec<(f32, T)> {
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}
