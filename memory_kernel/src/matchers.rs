/// Memory Kernel v1 — Constraint Matchers
///
/// A closed set of matcher variants behind one evaluation method.
/// Adding a matcher kind means adding a variant here.
///
/// Evaluation order per constraint is fixed:
///   1. Prohibition  — "never / do not / avoid <term>"
///   2. Procedural   — "verify|check <topic> before <action>"
///   3. Requirement  — "<topic> required", "must have <topic>", ...
///
/// All term matching is case-insensitive and word-bounded; substring
/// containment is never used for forbidden terms.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::ProjectionState;
use crate::policy::ProposalItem;

/// Negation cues recognised by the prohibition matcher, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegationCue {
    Never,
    DoNot,
    Avoid,
}

impl NegationCue {
    pub const ALL: [NegationCue; 3] = [NegationCue::Never, NegationCue::DoNot, NegationCue::Avoid];

    fn pattern(self) -> &'static str {
        match self {
            NegationCue::Never => r"\bnever\b",
            NegationCue::DoNot => r"\bdo\s+not\b",
            NegationCue::Avoid => r"\bavoid\b",
        }
    }

    fn regex(self) -> &'static Regex {
        static NEVER: OnceLock<Regex> = OnceLock::new();
        static DO_NOT: OnceLock<Regex> = OnceLock::new();
        static AVOID: OnceLock<Regex> = OnceLock::new();
        let cell = match self {
            NegationCue::Never => &NEVER,
            NegationCue::DoNot => &DO_NOT,
            NegationCue::Avoid => &AVOID,
        };
        cell.get_or_init(|| Regex::new(self.pattern()).expect("static cue pattern"))
    }
}

/// Discriminant reported alongside a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatcherKind {
    Prohibition,
    Procedural,
    Requirement,
}

/// Leading verbs stripped to find the core forbidden term
/// ("use eval()" -> "eval()").
const LEADING_VERBS: &[&str] = &[
    "use ", "call ", "invoke ", "execute ", "run ", "employ ", "utilize ",
    "apply ", "perform ", "do ", "make ", "create ", "add ", "include ",
];

const TRAILING_PUNCT: &[char] = &['.', ',', '!', '?', ';', ':', '"', '\'', ' '];

/// Topic words must be longer than this to count on their own.
const SIGNIFICANT_WORD_LEN: usize = 3;

/// A compiled matcher for one constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintMatcher {
    Prohibition {
        cue: NegationCue,
        forbidden: String,
        core_term: Option<String>,
    },
    Procedural {
        topic: String,
        action: String,
    },
    Requirement {
        topic: String,
    },
}

impl ConstraintMatcher {
    /// Compile every matcher that applies to `text`, in evaluation order.
    /// Text none of the shapes recognise compiles to no matchers and can
    /// never be violated.
    pub fn compile(text: &str) -> Vec<ConstraintMatcher> {
        let lowered = text.trim().to_lowercase();
        let mut matchers = Vec::new();

        for cue in NegationCue::ALL {
            let re = cue.regex();
            if !re.is_match(&lowered) {
                continue;
            }
            let stripped = re.replace_all(&lowered, "");
            let forbidden = collapse_whitespace(&stripped)
                .trim_end_matches(TRAILING_PUNCT)
                .to_string();
            if forbidden.is_empty() {
                continue;
            }
            let core_term = extract_core_term(&forbidden);
            matchers.push(ConstraintMatcher::Prohibition {
                cue,
                forbidden,
                core_term,
            });
        }

        if let Some((topic, action)) = parse_verify_before(text) {
            matchers.push(ConstraintMatcher::Procedural { topic, action });
        }

        if matchers.is_empty() {
            if let Some(topic) = parse_requirement(&lowered) {
                matchers.push(ConstraintMatcher::Requirement { topic });
            }
        }

        matchers
    }

    pub fn kind(&self) -> MatcherKind {
        match self {
            ConstraintMatcher::Prohibition { .. } => MatcherKind::Prohibition,
            ConstraintMatcher::Procedural { .. } => MatcherKind::Procedural,
            ConstraintMatcher::Requirement { .. } => MatcherKind::Requirement,
        }
    }

    /// Evaluate against one proposal item. Returns the reason on a match.
    pub fn evaluate(&self, item: &ProposalItem, state: &ProjectionState) -> Option<String> {
        let item_text = item.searchable_text().to_lowercase();

        match self {
            ConstraintMatcher::Prohibition {
                forbidden,
                core_term,
                ..
            } => {
                if contains_term(forbidden, &item_text) {
                    return Some(format!("proposal contains forbidden \"{}\"", forbidden));
                }
                match core_term {
                    Some(core) if contains_term(core, &item_text) => {
                        Some(format!("proposal contains forbidden \"{}\"", core))
                    }
                    _ => None,
                }
            }
            ConstraintMatcher::Procedural { topic, action } => {
                if matches_action(&item_text, action)
                    && !topic_verified(topic, &state.pending_verifications)
                {
                    Some(format!(
                        "\"{}\" was not verified before {}",
                        topic, action
                    ))
                } else {
                    None
                }
            }
            ConstraintMatcher::Requirement { topic } => {
                let ProposalItem::Decision { topic: item_topic, .. } = item else {
                    return None;
                };
                let mut addressed_in = item_text;
                if let Some(t) = item_topic {
                    addressed_in.push(' ');
                    addressed_in.push_str(&t.to_lowercase());
                }
                if mentions_all_significant_words(topic, &addressed_in)
                    || topic_verified(topic, &state.pending_verifications)
                {
                    None
                } else {
                    Some(format!(
                        "requirement \"{}\" was neither verified nor addressed by the decision",
                        topic
                    ))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn verify_before_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(verify|check)\s+(.+?)\s+before\s+(.+)$").expect("static verify pattern")
    })
}

fn requirement_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+?)\s+(?:is\s+|are\s+)?required$").expect("static requirement pattern")
    })
}

fn requirement_prefix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:requires?|must\s+have|must\s+be|needs?)\s+(.+)$")
            .expect("static requirement pattern")
    })
}

/// `verify <topic> before <action>` -> (topic, action), both lowercased.
fn parse_verify_before(text: &str) -> Option<(String, String)> {
    let normalized = text
        .trim()
        .trim_end_matches(['.', ',', '!', '?', ';', ':']);
    let caps = verify_before_regex().captures(normalized)?;
    let topic = caps.get(2)?.as_str().trim().to_lowercase();
    let action = caps.get(3)?.as_str().trim().to_lowercase();
    if topic.is_empty() || action.is_empty() {
        return None;
    }
    Some((topic, action))
}

fn parse_requirement(lowered: &str) -> Option<String> {
    let normalized = collapse_whitespace(lowered);
    let normalized = normalized.trim_end_matches(TRAILING_PUNCT);
    let caps = requirement_suffix_regex()
        .captures(normalized)
        .or_else(|| requirement_prefix_regex().captures(normalized))?;
    let topic = caps.get(1)?.as_str().trim().to_string();
    (!topic.is_empty()).then_some(topic)
}

fn extract_core_term(forbidden: &str) -> Option<String> {
    LEADING_VERBS.iter().find_map(|verb| {
        forbidden
            .strip_prefix(verb)
            .map(|rest| rest.trim().to_string())
            .filter(|rest| !rest.is_empty())
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn significant_words(topic: &str) -> impl Iterator<Item = &str> {
    topic
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !is_word_char(c)))
        .filter(|w| w.chars().count() > SIGNIFICANT_WORD_LEN)
}

// ---------------------------------------------------------------------------
// Matching helpers
// ---------------------------------------------------------------------------

/// Word-boundary search for `term` in `text`. A boundary is only
/// required on a side where the term begins or ends with a word
/// character, so "eval()" still matches.
pub fn contains_term(term: &str, text: &str) -> bool {
    let term = term.to_lowercase();
    let Some(last) = term.chars().last() else {
        return false;
    };
    let bounded_right = is_word_char(last);
    bounded_occurrences(&text.to_lowercase(), &term, |rest| {
        !bounded_right || !starts_with_word_char(rest)
    })
}

/// Does the item denote an action of this type? Accepts the action
/// itself or its stem with a common verb ending ("booking" ~ "book").
pub fn matches_action(item_text: &str, action: &str) -> bool {
    if contains_term(action, item_text) {
        return true;
    }

    let action = action.to_lowercase();
    let stem = ["ing", "ed", "s"]
        .iter()
        .find_map(|suffix| action.strip_suffix(suffix))
        .unwrap_or(action.as_str());
    if stem.chars().count() < 3 || stem == action {
        return false;
    }

    bounded_occurrences(&item_text.to_lowercase(), stem, |rest| {
        ["ing", "ed", "s", "e", ""].iter().any(|ending| {
            rest.strip_prefix(*ending)
                .is_some_and(|after| !starts_with_word_char(after))
        })
    })
}

/// True if some occurrence of `needle` in `haystack` sits on a word
/// boundary to its left (when it starts with a word character) and
/// `tail_ok` accepts the text after it. Occurrences may overlap.
fn bounded_occurrences(haystack: &str, needle: &str, tail_ok: impl Fn(&str) -> bool) -> bool {
    let Some(first) = needle.chars().next() else {
        return false;
    };
    let bounded_left = is_word_char(first);

    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let at = from + offset;
        let left_ok = !bounded_left
            || !haystack[..at].chars().next_back().is_some_and(is_word_char);
        if left_ok && tail_ok(&haystack[at + needle.len()..]) {
            return true;
        }
        from = at + first.len_utf8();
    }
    false
}

fn starts_with_word_char(s: &str) -> bool {
    s.chars().next().is_some_and(is_word_char)
}

/// A topic counts as verified when it, or any significant word of it,
/// is pending, or a pending token contains / is contained in it.
pub fn topic_verified(topic: &str, pending: &BTreeSet<String>) -> bool {
    if pending.contains(topic) {
        return true;
    }
    if significant_words(topic).any(|w| pending.contains(w)) {
        return true;
    }
    pending
        .iter()
        .any(|v| !v.is_empty() && (topic.contains(v.as_str()) || v.contains(topic)))
}

fn mentions_all_significant_words(topic: &str, text: &str) -> bool {
    let mut words = significant_words(topic).peekable();
    if words.peek().is_none() {
        return contains_term(topic, text);
    }
    words.all(|w| contains_term(w, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(text: &str) -> ProposalItem {
        ProposalItem::decision(text)
    }

    #[test]
    fn test_never_compiles_core_term() {
        let matchers = ConstraintMatcher::compile("Never use eval()");
        assert_eq!(
            matchers,
            vec![ConstraintMatcher::Prohibition {
                cue: NegationCue::Never,
                forbidden: "use eval()".to_string(),
                core_term: Some("eval()".to_string()),
            }]
        );
    }

    #[test]
    fn test_word_boundary_rejects_substring() {
        assert!(contains_term("eval", "we will eval the input"));
        assert!(!contains_term("eval", "we will evaluate the input"));
        assert!(contains_term("eval()", "call eval() here"));
    }

    #[test]
    fn test_verify_before_parses_and_strips_punctuation() {
        let matchers = ConstraintMatcher::compile("Verify accessibility before booking.");
        assert_eq!(
            matchers,
            vec![ConstraintMatcher::Procedural {
                topic: "accessibility".to_string(),
                action: "booking".to_string(),
            }]
        );
    }

    #[test]
    fn test_overlapping_occurrences_are_all_tried() {
        assert!(contains_term("a a", "ba a a"));
        assert!(contains_term("EVAL", "Use Eval now"));
        assert!(!contains_term("", "anything"));
        assert!(contains_term("(admin)", "grant(admin)access"));
    }

    #[test]
    fn test_action_stem_matches_verb_forms() {
        assert!(matches_action("book ryokan x", "booking"));
        assert!(matches_action("booked the hotel", "booking"));
        assert!(!matches_action("read a notebook", "booking"));
    }

    #[test]
    fn test_requirement_shapes() {
        assert_eq!(
            ConstraintMatcher::compile("wheelchair accessible required"),
            vec![ConstraintMatcher::Requirement {
                topic: "wheelchair accessible".to_string()
            }]
        );
        assert_eq!(
            ConstraintMatcher::compile("Must have vegetarian options"),
            vec![ConstraintMatcher::Requirement {
                topic: "vegetarian options".to_string()
            }]
        );
        assert!(ConstraintMatcher::compile("prefer ryokan").is_empty());
    }

    #[test]
    fn test_requirement_satisfied_by_mention_or_verification() {
        let matcher = ConstraintMatcher::Requirement {
            topic: "wheelchair accessible".to_string(),
        };
        let mut state = ProjectionState::default();

        assert!(matcher.evaluate(&decision("book Ryokan X"), &state).is_some());
        assert!(matcher
            .evaluate(&decision("book wheelchair accessible room at Granvia"), &state)
            .is_none());

        state.pending_verifications.insert("wheelchair".to_string());
        assert!(matcher.evaluate(&decision("book Ryokan X"), &state).is_none());
    }

    #[test]
    fn test_requirement_ignores_facts() {
        let matcher = ConstraintMatcher::Requirement {
            topic: "wheelchair accessible".to_string(),
        };
        let item = ProposalItem::fact("hotel", serde_json::json!("Ryokan X"));
        assert!(matcher.evaluate(&item, &ProjectionState::default()).is_none());
    }

    #[test]
    fn test_topic_verified_by_significant_word() {
        let pending: BTreeSet<String> = ["dietary".to_string()].into_iter().collect();
        assert!(topic_verified("dietary restrictions", &pending));
        assert!(!topic_verified("accessibility", &pending));
    }
}
