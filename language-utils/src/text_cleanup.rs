//! Language-specific text cleanup utilities
//!
//! Generated sentences come back from the language model with stray
//! whitespace, wrapping quotes and typographic variants that should not end
//! up on a card. These helpers normalize them before the sentence is stored.

use crate::Language;

/// Clean up a generated sentence before it is written to the deck.
///
/// - Replaces non-breaking and other exotic spaces with a regular space
/// - Collapses runs of whitespace and trims both ends
/// - Removes a pair of straight double quotes wrapping the whole sentence
/// - For English: replaces typographic apostrophes with `'`
pub fn cleanup_sentence(sentence: String, language: Language) -> String {
    let normalized = sentence
        .chars()
        .map(|c| match c {
            // no-break space, narrow no-break space, figure space, thin space
            '\u{00A0}' | '\u{202F}' | '\u{2007}' | '\u{2009}' => ' ',
            _ => c,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let unquoted = strip_wrapping_quotes(&normalized);

    match language {
        Language::English => unquoted.replace(['\u{2019}', '\u{2018}'], "'"),
        Language::German | Language::Russian => unquoted.to_string(),
    }
}

/// Removes one pair of `"` wrapping the whole text, if nothing else is quoted inside
fn strip_wrapping_quotes(text: &str) -> &str {
    match text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
        Some(inner) if !inner.contains('"') => inner.trim(),
        _ => text,
    }
}

/// Clean up a single table cell (word, part of speech, translation)
pub fn cleanup_field(field: &str) -> Option<String> {
    let field = field.split_whitespace().collect::<Vec<_>>().join(" ");
    if field.is_empty() { None } else { Some(field) }
}
