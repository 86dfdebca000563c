//! Drift detection — determinism verification and state comparison.
//!
//! Drift is never stored. It is computed by comparing two projections.
//! All scores are integers; no float arithmetic anywhere.

use std::collections::{BTreeMap, BTreeSet};

use memory_kernel::domain::{ConstraintProjection, FactProjection, ProjectionState};
use memory_kernel::events::Event;
use serde::Serialize;

use crate::replay;

/// Score weights per change. Constraints matter most.
pub const FACT_WEIGHT: i64 = 2;
pub const CONSTRAINT_WEIGHT: i64 = 4;
pub const DECISION_WEIGHT: i64 = 1;

/// Hashes from two independent replays of the same events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismCheck {
    pub first: String,
    pub second: String,
}

impl DeterminismCheck {
    pub fn holds(&self) -> bool {
        self.first == self.second
    }
}

/// Replay the same events twice and compare canonical hashes.
pub fn verify_determinism(events: &[Event]) -> DeterminismCheck {
    let first = replay::rebuild_hash(events);
    let second = replay::rebuild_hash(events);
    DeterminismCheck { first, second }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

/// Structured difference from state `a` to state `b`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct StateDiff {
    pub added_facts: BTreeMap<String, FactProjection>,
    pub removed_facts: BTreeMap<String, FactProjection>,
    /// Value or confidence changed.
    pub changed_facts: BTreeMap<String, Change<FactProjection>>,
    pub added_constraints: BTreeMap<String, ConstraintProjection>,
    pub removed_constraints: BTreeMap<String, ConstraintProjection>,
    /// Activity flipped.
    pub changed_constraints: BTreeMap<String, Change<ConstraintProjection>>,
    pub decision_count_delta: i64,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.added_facts.is_empty()
            && self.removed_facts.is_empty()
            && self.changed_facts.is_empty()
            && self.added_constraints.is_empty()
            && self.removed_constraints.is_empty()
            && self.changed_constraints.is_empty()
            && self.decision_count_delta == 0
    }
}

pub fn compare_states(a: &ProjectionState, b: &ProjectionState) -> StateDiff {
    let mut diff = StateDiff::default();

    let fact_keys: BTreeSet<&String> = a.facts.keys().chain(b.facts.keys()).collect();
    for key in fact_keys {
        match (a.facts.get(key), b.facts.get(key)) {
            (None, Some(f)) => {
                diff.added_facts.insert(key.clone(), f.clone());
            }
            (Some(f), None) => {
                diff.removed_facts.insert(key.clone(), f.clone());
            }
            (Some(fa), Some(fb)) if fa.value != fb.value || fa.confidence != fb.confidence => {
                diff.changed_facts.insert(
                    key.clone(),
                    Change {
                        before: fa.clone(),
                        after: fb.clone(),
                    },
                );
            }
            _ => {}
        }
    }

    let constraint_keys: BTreeSet<&String> =
        a.constraints.keys().chain(b.constraints.keys()).collect();
    for key in constraint_keys {
        match (a.constraints.get(key), b.constraints.get(key)) {
            (None, Some(c)) => {
                diff.added_constraints.insert(key.clone(), c.clone());
            }
            (Some(c), None) => {
                diff.removed_constraints.insert(key.clone(), c.clone());
            }
            (Some(ca), Some(cb)) if ca.active != cb.active => {
                diff.changed_constraints.insert(
                    key.clone(),
                    Change {
                        before: ca.clone(),
                        after: cb.clone(),
                    },
                );
            }
            _ => {}
        }
    }

    diff.decision_count_delta = b.decisions.len() as i64 - a.decisions.len() as i64;
    diff
}

/// Change counts between two states — all values are i64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DriftMetrics {
    pub fact_changes: i64,
    pub constraint_changes: i64,
    pub decision_changes: i64,
    pub score: i64,
}

pub fn measure_drift(diff: &StateDiff) -> DriftMetrics {
    let fact_changes =
        (diff.added_facts.len() + diff.removed_facts.len() + diff.changed_facts.len()) as i64;
    let constraint_changes = (diff.added_constraints.len()
        + diff.removed_constraints.len()
        + diff.changed_constraints.len()) as i64;
    let decision_changes = diff.decision_count_delta.abs();

    DriftMetrics {
        fact_changes,
        constraint_changes,
        decision_changes,
        score: fact_changes * FACT_WEIGHT
            + constraint_changes * CONSTRAINT_WEIGHT
            + decision_changes * DECISION_WEIGHT,
    }
}
