/// Memory Kernel v1 — Verification Topic Extraction
///
/// Turns a query question into the finite set of topic tokens that the
/// fold records in `pending_verifications`.
///
/// Matching is plain keyword containment, not semantics. The extractor
/// is a trait so other matchers can be plugged into the projector.

use std::collections::BTreeSet;

/// Standardized terms agents are instructed to use in queries.
pub const KNOWN_KEYWORDS: &[&str] = &[
    // accessibility
    "accessibility", "accessible", "wheelchair", "mobility",
    // financial
    "budget", "price", "cost", "rate", "fee",
    // travel
    "destination", "booking", "book", "canceling", "cancel",
    "selecting", "select", "hotel", "flight", "room",
    // dietary
    "dietary", "vegetarian", "vegan", "allergies", "allergy",
    // actions
    "verify", "check", "confirm", "review",
];

/// Tokens kept besides known keywords must be longer than this.
pub const MIN_FREE_TOKEN_LEN: usize = 3;

const TOKEN_TRIM: &[char] = &['.', ',', '!', '?', '"', '\'', '(', ')', '[', ']'];

/// Extracts verification topics from a query question.
///
/// Implementations must be deterministic: the same question always
/// yields the same set, or replay diverges.
pub trait TopicExtractor: Send + Sync {
    fn extract(&self, question: &str) -> BTreeSet<String>;
}

/// Default extractor: known keywords by containment, plus every
/// free-standing word longer than three characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordTopicExtractor;

impl TopicExtractor for KeywordTopicExtractor {
    fn extract(&self, question: &str) -> BTreeSet<String> {
        let lowered = question.to_lowercase();
        let mut found: BTreeSet<String> = KNOWN_KEYWORDS
            .iter()
            .filter(|kw| lowered.contains(*kw))
            .map(|kw| kw.to_string())
            .collect();

        for word in lowered.split_whitespace() {
            let word = word.trim_matches(TOKEN_TRIM);
            if word.chars().count() > MIN_FREE_TOKEN_LEN {
                found.insert(word.to_string());
            }
        }

        found
    }
}
