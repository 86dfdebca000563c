/// Memory Kernel v1 — Policy Engine
///
/// Gates every proposed write against the active constraints of a
/// projection. Pure: it reads a state and a proposal and returns a
/// verdict. It never touches the log.
///
/// Evaluation order is fixed and nothing short-circuits:
///   for each item (proposal order)
///     for each active constraint (normalized-key order)
///       for each matcher (Prohibition -> Procedural -> Requirement)
///
/// The first blocking match is the reported violation. Every blocking
/// match is kept in `violations`, so two contradictory constraints are
/// both surfaced and neither wins. Matches on `preferred` constraints
/// are advisories and never block.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Priority, ProjectionState};
use crate::events::Seq;
use crate::matchers::{ConstraintMatcher, MatcherKind};

// ── Proposal ───────────────────────────────────────────────────────

/// One candidate mutation inside a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProposalItem {
    Decision {
        text: String,
        #[serde(default)]
        rationale: String,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        references: BTreeSet<Seq>,
    },
    Fact {
        key: String,
        value: Value,
    },
    Constraint {
        text: String,
    },
}

impl ProposalItem {
    pub fn decision(text: &str) -> Self {
        ProposalItem::Decision {
            text: text.to_string(),
            rationale: String::new(),
            topic: None,
            references: BTreeSet::new(),
        }
    }

    pub fn fact(key: &str, value: Value) -> Self {
        ProposalItem::Fact {
            key: key.to_string(),
            value,
        }
    }

    pub fn constraint(text: &str) -> Self {
        ProposalItem::Constraint {
            text: text.to_string(),
        }
    }

    /// Text the matchers search: text, value and key joined by spaces.
    pub fn searchable_text(&self) -> String {
        match self {
            ProposalItem::Decision { text, .. } => text.clone(),
            ProposalItem::Constraint { text } => text.clone(),
            ProposalItem::Fact { key, value } => {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{} {}", value, key)
            }
        }
    }
}

/// A transient, never-persisted set of candidate mutations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WriteProposal {
    pub items: Vec<ProposalItem>,
}

impl WriteProposal {
    pub fn new(items: Vec<ProposalItem>) -> Self {
        Self { items }
    }

    pub fn single(item: ProposalItem) -> Self {
        Self { items: vec![item] }
    }

    /// A proposal holding one bare decision.
    pub fn decision(text: &str) -> Self {
        Self::single(ProposalItem::decision(text))
    }
}

// ── Verdict ────────────────────────────────────────────────────────

/// A constraint matched by a proposal item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub constraint_text: String,
    pub constraint_key: String,
    pub source_seq: Seq,
    pub priority: Priority,
    pub matcher: MatcherKind,
    pub item_index: usize,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} constraint \"{}\" (seq {}): {}",
            self.priority, self.constraint_text, self.source_seq, self.reason
        )
    }
}

/// Outcome of a policy check. A block is a normal value, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyResult {
    pub allowed: bool,
    /// First blocking violation in evaluation order.
    pub violation: Option<Violation>,
    /// Every blocking violation, in evaluation order.
    pub violations: Vec<Violation>,
    /// Matches on `preferred` constraints.
    pub advisories: Vec<Violation>,
}

impl PolicyResult {
    pub fn is_blocked(&self) -> bool {
        !self.allowed
    }

    /// Human-readable explanation of a block.
    pub fn reason(&self) -> Option<String> {
        self.violation.as_ref().map(|v| match self.violations.len() {
            0 | 1 => v.to_string(),
            n => format!("{} (and {} more)", v, n - 1),
        })
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// Stateless constraint evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        PolicyEngine
    }

    pub fn check(&self, proposal: &WriteProposal, state: &ProjectionState) -> PolicyResult {
        check(proposal, state)
    }
}

/// Evaluate a proposal against every active constraint of `state`.
pub fn check(proposal: &WriteProposal, state: &ProjectionState) -> PolicyResult {
    let compiled: Vec<(&String, _, Vec<ConstraintMatcher>)> = state
        .active_constraints()
        .map(|(key, c)| (key, c, ConstraintMatcher::compile(&c.text)))
        .collect();

    let mut violations = Vec::new();
    let mut advisories = Vec::new();

    for (item_index, item) in proposal.items.iter().enumerate() {
        for (key, constraint, matchers) in &compiled {
            for matcher in matchers {
                let Some(reason) = matcher.evaluate(item, state) else {
                    continue;
                };
                let v = Violation {
                    constraint_text: constraint.text.clone(),
                    constraint_key: (*key).clone(),
                    source_seq: constraint.source_seq,
                    priority: constraint.priority,
                    matcher: matcher.kind(),
                    item_index,
                    reason,
                };
                if constraint.priority.is_blocking() {
                    violations.push(v);
                } else {
                    advisories.push(v);
                }
            }
        }
    }

    PolicyResult {
        allowed: violations.is_empty(),
        violation: violations.first().cloned(),
        violations,
        advisories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{normalize_constraint_key, ConstraintProjection};

    fn with_constraint(text: &str, priority: Priority, seq: u64) -> ProjectionState {
        let mut state = ProjectionState::default();
        add(&mut state, text, priority, seq);
        state
    }

    fn add(state: &mut ProjectionState, text: &str, priority: Priority, seq: u64) {
        state.constraints.insert(
            normalize_constraint_key(text),
            ConstraintProjection {
                text: text.to_string(),
                priority,
                active: true,
                source_seq: Seq(seq),
                triggered_by: None,
            },
        );
    }

    #[test]
    fn test_preferred_is_advisory_only() {
        let state = with_constraint("avoid chains", Priority::Preferred, 2);
        let result = check(&WriteProposal::decision("book a chains hotel"), &state);
        assert!(result.allowed);
        assert_eq!(result.advisories.len(), 1);
        assert!(result.violation.is_none());
    }

    #[test]
    fn test_inactive_constraint_is_ignored() {
        let mut state = with_constraint("never use eval", Priority::Required, 1);
        for c in state.constraints.values_mut() {
            c.active = false;
        }
        assert!(check(&WriteProposal::decision("use eval"), &state).allowed);
    }

    #[test]
    fn test_contradictory_constraints_both_reported() {
        let mut state = with_constraint("never book ryokan", Priority::Required, 1);
        add(&mut state, "ryokan required", Priority::Required, 2);

        let with_ryokan = check(&WriteProposal::decision("book ryokan"), &state);
        assert!(with_ryokan.is_blocked());
        assert_eq!(with_ryokan.violations.len(), 1);
        assert_eq!(with_ryokan.violations[0].matcher, MatcherKind::Prohibition);

        let without = check(&WriteProposal::decision("book a hostel"), &state);
        assert!(without.is_blocked());
        assert_eq!(without.violations[0].matcher, MatcherKind::Requirement);
    }

    #[test]
    fn test_blocked_result_explains_itself() {
        let state = with_constraint("Never use eval", Priority::Learned, 9);
        let result = check(&WriteProposal::decision("use eval on input"), &state);
        let v = result.violation.clone().expect("blocked");
        assert_eq!(v.source_seq, Seq(9));
        assert_eq!(v.priority, Priority::Learned);
        assert_eq!(v.constraint_text, "Never use eval");
        assert!(result.reason().unwrap_or_default().contains("seq 9"));
    }

    #[test]
    fn test_fact_items_are_searched_by_value_and_key() {
        let state = with_constraint("never use plaintext", Priority::Required, 3);
        let item = ProposalItem::fact("password_format", serde_json::json!("plaintext"));
        let result = check(&WriteProposal::single(item), &state);
        assert!(result.is_blocked());
        assert_eq!(result.violations[0].item_index, 0);
    }
}
