//! Provenance Tracer — explains how a fact or decision arose.
//!
//! Walks `caused_by` links backward from a starting event until an
//! event with no cause. Termination follows from the log invariant
//! that a cause is always a strictly smaller seq.

use std::sync::Arc;

use memory_kernel::events::{Event, Seq};
use memory_kernel::projection::Projector;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::event_log::{event_at, EventLog};

/// Where a trace starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceTarget {
    Seq(Seq),
    /// The most recent event that set this fact.
    FactKey(String),
}

impl From<Seq> for TraceTarget {
    fn from(seq: Seq) -> Self {
        TraceTarget::Seq(seq)
    }
}

impl From<&str> for TraceTarget {
    fn from(key: &str) -> Self {
        TraceTarget::FactKey(key.to_string())
    }
}

/// The causal chain starting at `start`, newest first.
///
/// Returns `None` if `start` or any referenced cause is missing.
pub fn causal_chain(events: &[Event], start: Seq) -> Option<Vec<Event>> {
    let mut chain = Vec::new();
    let mut current = Some(start);

    while let Some(seq) = current {
        let event = event_at(events, seq)?;
        chain.push(event.clone());
        current = event.caused_by.filter(|cause| *cause < seq);
    }

    Some(chain)
}

#[derive(Clone)]
pub struct ProvenanceTracer {
    log: Arc<EventLog>,
    projector: Projector,
}

impl ProvenanceTracer {
    pub fn new(log: Arc<EventLog>, projector: Projector) -> Self {
        Self { log, projector }
    }

    pub fn trace(&self, target: &TraceTarget) -> Result<Vec<Event>> {
        let snapshot = self.log.snapshot();
        let start = match target {
            TraceTarget::Seq(seq) => *seq,
            TraceTarget::FactKey(key) => self
                .projector
                .fold(snapshot.iter())
                .fact(key)
                .map(|f| f.source_seq)
                .ok_or_else(|| MemoryError::NotFound(format!("no fact with key {:?}", key)))?,
        };

        causal_chain(&snapshot, start)
            .ok_or_else(|| MemoryError::NotFound(format!("no event with seq {}", start)))
    }

    /// Every event sharing the correlation id of `seq`, ascending.
    /// An uncorrelated event is its own cluster.
    pub fn correlation_cluster(&self, seq: Seq) -> Result<Vec<Event>> {
        let snapshot = self.log.snapshot();
        let event = event_at(&snapshot, seq)
            .ok_or_else(|| MemoryError::NotFound(format!("no event with seq {}", seq)))?;

        Ok(match &event.correlation_id {
            Some(id) => snapshot
                .iter()
                .filter(|e| e.correlation_id.as_ref() == Some(id))
                .cloned()
                .collect(),
            None => vec![event.clone()],
        })
    }
}
