//! Keyword fallback for highlight notes
//!
//! Tokens are runs of ASCII letters, digits and apostrophes. Stopwords,
//! numbers and tokens shorter than three characters are dropped; the rest
//! are ranked by frequency, ties broken by first appearance.

use std::collections::HashMap;

/// Default number of keywords in a note
pub const MAX_KEYWORDS: usize = 4;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "were", "will", "shall",
    "into", "your", "have", "has", "had", "but", "not", "can", "could", "would", "should", "a",
    "an", "of", "on", "in", "to", "as", "by", "it", "its", "at", "or", "be", "is", "we", "our",
    "you", "their", "there", "about", "over", "any", "all", "more", "most", "such", "other", "than",
    "may", "if", "also",
];

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Extract up to `max_keywords` capitalised keywords from `text`
///
/// When every token is filtered out, the first tokens are returned instead.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    for (position, raw) in tokens(text).enumerate() {
        let token = raw.to_lowercase();
        let token = token.trim_matches(|c| c == '\'' || c == '_');
        if token.len() < 3
            || STOPWORDS.contains(&token)
            || token.chars().all(|c| c.is_ascii_digit())
        {
            continue;
        }
        counts
            .entry(token.to_string())
            .and_modify(|(count, _)| *count += 1)
            .or_insert((1, position));
    }

    if counts.is_empty() {
        return tokens(text).take(max_keywords).map(capitalize).collect();
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));

    ranked
        .into_iter()
        .take(max_keywords)
        .map(|(word, _)| capitalize(&word))
        .collect()
}

/// Keywords joined into a note, or `None` when the text has no tokens
pub fn keyword_note(text: &str) -> Option<String> {
    let keywords = extract_keywords(text, MAX_KEYWORDS);
    if keywords.is_empty() {
        None
    } else {
        Some(keywords.join(" "))
    }
}
