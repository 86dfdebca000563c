/// Memory Kernel v1 — Projection Engine
///
/// ALL state construction lives here. The fold is a strict left fold:
/// each event's effect is a deterministic function of (prior state, event).
///
/// The fold is total. A payload missing its primary field is a no-op for
/// that event, except that a DecisionMade event always clears
/// `pending_verifications`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::domain::{
    normalize_constraint_key, Confidence, ConstraintProjection, DecisionProjection,
    FactProjection, Priority, ProjectionState,
};
use crate::events::{fields, Event, EventKind, Seq};
use crate::topics::{KeywordTopicExtractor, TopicExtractor};

/// Fold events into a fresh state with the default topic extractor.
pub fn fold<'a, I>(events: I) -> ProjectionState
where
    I: IntoIterator<Item = &'a Event>,
{
    Projector::default().fold(events)
}

/// Folds event sequences into `ProjectionState`.
///
/// The only component allowed to construct state.
#[derive(Clone)]
pub struct Projector {
    topics: Arc<dyn TopicExtractor>,
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(Arc::new(KeywordTopicExtractor))
    }
}

impl fmt::Debug for Projector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projector").finish_non_exhaustive()
    }
}

impl Projector {
    pub fn new(topics: Arc<dyn TopicExtractor>) -> Self {
        Self { topics }
    }

    /// Fold an ordered event sequence from the empty state.
    pub fn fold<'a, I>(&self, events: I) -> ProjectionState
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut state = ProjectionState::default();
        for event in events {
            self.apply_in_place(&mut state, event);
        }
        state
    }

    /// Apply one event to `state` and return the successor state.
    /// The input state is never mutated.
    pub fn apply(&self, state: &ProjectionState, event: &Event) -> ProjectionState {
        let mut next = state.clone();
        self.apply_in_place(&mut next, event);
        next
    }

    /// Topics a question would mark as verified.
    pub fn topics_for(&self, question: &str) -> BTreeSet<String> {
        self.topics.extract(question)
    }

    fn apply_in_place(&self, state: &mut ProjectionState, event: &Event) {
        state.event_count += 1;
        if !event.seq.is_synthetic() && event.seq > state.last_seq {
            state.last_seq = event.seq;
        }

        match event.kind {
            EventKind::FactAdded => apply_fact_added(state, event),
            EventKind::ConstraintAdded => apply_constraint_added(state, event),
            EventKind::ConstraintDeactivated => apply_constraint_deactivated(state, event),
            EventKind::DecisionMade => apply_decision_made(state, event),
            EventKind::MemoryQueryIssued => {
                if let Some(question) = event.payload_str(fields::QUESTION) {
                    state
                        .pending_verifications
                        .extend(self.topics.extract(question));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-kind fold rules (private)
// ---------------------------------------------------------------------------

fn apply_fact_added(state: &mut ProjectionState, event: &Event) {
    let key = match event.payload_str(fields::KEY) {
        Some(k) if !k.is_empty() => k,
        _ => return,
    };
    let value = event
        .payload
        .get(fields::VALUE)
        .cloned()
        .unwrap_or(Value::Null);

    state.facts.insert(
        key.to_string(),
        FactProjection {
            key: key.to_string(),
            value,
            confidence: Confidence::from_payload(event.payload.get(fields::CONFIDENCE)),
            source_seq: event.seq,
        },
    );
}

fn apply_constraint_added(state: &mut ProjectionState, event: &Event) {
    let text = match event.payload_str(fields::TEXT).map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return,
    };
    let priority = event
        .payload_str(fields::PRIORITY)
        .and_then(|p| p.parse::<Priority>().ok())
        .unwrap_or_default();

    state.constraints.insert(
        normalize_constraint_key(text),
        ConstraintProjection {
            text: text.to_string(),
            priority,
            active: true,
            source_seq: event.seq,
            triggered_by: event.payload_seq(fields::TRIGGERED_BY),
        },
    );
}

fn apply_constraint_deactivated(state: &mut ProjectionState, event: &Event) {
    if let Some(text) = event.payload_str(fields::TEXT) {
        if let Some(c) = state.constraints.get_mut(&normalize_constraint_key(text)) {
            c.active = false;
        }
    }
}

fn apply_decision_made(state: &mut ProjectionState, event: &Event) {
    if let Some(text) = event.payload_str(fields::TEXT).filter(|t| !t.is_empty()) {
        let references: BTreeSet<Seq> = event
            .payload
            .get(fields::REFERENCES)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_u64).map(Seq).collect())
            .unwrap_or_default();

        state.decisions.push(DecisionProjection {
            text: text.to_string(),
            rationale: event
                .payload_str(fields::RATIONALE)
                .unwrap_or_default()
                .to_string(),
            references,
            status: DecisionProjection::status_from_payload(event.payload_str(fields::STATUS)),
            topic: event.payload_str(fields::TOPIC).map(str::to_string),
            source_seq: event.seq,
        });
    }

    // Verification is scoped to the next decision only.
    state.pending_verifications.clear();
}
