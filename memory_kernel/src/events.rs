/// Memory Kernel v1 — Event Definitions
///
/// Events are pure data: a closed kind plus a JSON payload bag.
/// They contain ZERO fold logic.
///
/// Once appended, an event never changes. Corrections are new events.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{Confidence, DecisionStatus, Priority, QueryScope};

/// Payload field names shared by the fold, validation and the runtime.
pub mod fields {
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
    pub const CONFIDENCE: &str = "confidence";
    pub const TEXT: &str = "text";
    pub const PRIORITY: &str = "priority";
    pub const TRIGGERED_BY: &str = "triggered_by";
    pub const RATIONALE: &str = "rationale";
    pub const REFERENCES: &str = "references";
    pub const STATUS: &str = "status";
    pub const TOPIC: &str = "topic";
    pub const QUESTION: &str = "question";
    pub const SCOPE: &str = "scope";
}

/// Position of an event in the log. Real events start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(pub u64);

impl Seq {
    /// Reserved for events that only exist inside a counterfactual
    /// sequence. The log never assigns it.
    pub const SYNTHETIC: Seq = Seq(0);

    /// First sequence number the log hands out.
    pub const FIRST: Seq = Seq(1);

    pub fn next(self) -> Seq {
        Seq(self.0 + 1)
    }

    pub fn is_synthetic(self) -> bool {
        self == Self::SYNTHETIC
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Seq {
    fn from(v: u64) -> Self {
        Seq(v)
    }
}

/// Closed set of event kinds consumed and produced by the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    FactAdded,
    ConstraintAdded,
    ConstraintDeactivated,
    DecisionMade,
    MemoryQueryIssued,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::FactAdded,
        EventKind::ConstraintAdded,
        EventKind::ConstraintDeactivated,
        EventKind::DecisionMade,
        EventKind::MemoryQueryIssued,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::FactAdded => "FactAdded",
            EventKind::ConstraintAdded => "ConstraintAdded",
            EventKind::ConstraintDeactivated => "ConstraintDeactivated",
            EventKind::DecisionMade => "DecisionMade",
            EventKind::MemoryQueryIssued => "MemoryQueryIssued",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// An immutable, committed (or synthetic) event.
///
/// Serialized at the boundary with exactly these six fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: Seq,
    pub logical_time: u64,
    pub kind: EventKind,
    pub payload: Value,
    pub caused_by: Option<Seq>,
    pub correlation_id: Option<String>,
}

impl Event {
    /// String field of the payload, if present.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// Sequence-number field of the payload, if present and positive.
    pub fn payload_seq(&self, field: &str) -> Option<Seq> {
        self.payload
            .get(field)
            .and_then(Value::as_u64)
            .filter(|v| *v > 0)
            .map(Seq)
    }
}

/// An event before the log has assigned it a position.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub payload: Value,
    pub caused_by: Option<Seq>,
    pub correlation_id: Option<String>,
}

impl EventDraft {
    pub fn new(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            caused_by: None,
            correlation_id: None,
        }
    }

    pub fn fact_added(key: &str, value: Value, confidence: Confidence) -> Self {
        Self::new(
            EventKind::FactAdded,
            json!({
                (fields::KEY): key,
                (fields::VALUE): value,
                (fields::CONFIDENCE): confidence.basis_points(),
            }),
        )
    }

    pub fn constraint_added(text: &str, priority: Priority, triggered_by: Option<Seq>) -> Self {
        let mut payload = Map::new();
        payload.insert(fields::TEXT.to_string(), Value::String(text.to_string()));
        payload.insert(
            fields::PRIORITY.to_string(),
            Value::String(priority.as_str().to_string()),
        );
        payload.insert(
            fields::TRIGGERED_BY.to_string(),
            triggered_by.map_or(Value::Null, |s| Value::from(s.0)),
        );
        Self::new(EventKind::ConstraintAdded, Value::Object(payload))
    }

    pub fn constraint_deactivated(text: &str) -> Self {
        Self::new(
            EventKind::ConstraintDeactivated,
            json!({ (fields::TEXT): text }),
        )
    }

    pub fn decision_made(
        text: &str,
        rationale: &str,
        references: &BTreeSet<Seq>,
        status: DecisionStatus,
        topic: Option<&str>,
    ) -> Self {
        let refs: Vec<u64> = references.iter().map(|s| s.0).collect();
        let mut payload = Map::new();
        payload.insert(fields::TEXT.to_string(), Value::String(text.to_string()));
        payload.insert(
            fields::RATIONALE.to_string(),
            Value::String(rationale.to_string()),
        );
        payload.insert(fields::REFERENCES.to_string(), json!(refs));
        payload.insert(
            fields::STATUS.to_string(),
            Value::String(status.as_str().to_string()),
        );
        if let Some(topic) = topic {
            payload.insert(fields::TOPIC.to_string(), Value::String(topic.to_string()));
        }
        Self::new(EventKind::DecisionMade, Value::Object(payload))
    }

    pub fn query_issued(question: &str, scope: QueryScope) -> Self {
        Self::new(
            EventKind::MemoryQueryIssued,
            json!({
                (fields::QUESTION): question,
                (fields::SCOPE): scope.as_str(),
            }),
        )
    }

    pub fn caused_by(mut self, seq: Seq) -> Self {
        self.caused_by = Some(seq);
        self
    }

    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Bind the draft to a log position.
    pub fn into_event(self, seq: Seq, logical_time: u64) -> Event {
        Event {
            seq,
            logical_time,
            kind: self.kind,
            payload: self.payload,
            caused_by: self.caused_by,
            correlation_id: self.correlation_id,
        }
    }
}
