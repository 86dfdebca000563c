//! Replay Engine — rebuild state from the event log.
//!
//! Every query shape (as-of, exclusion, range, counterfactual) builds a
//! derived event sequence from one log snapshot and hands it to the
//! kernel fold. No shortcuts, no cached state, and nothing here ever
//! appends to the log.

use std::collections::BTreeSet;
use std::sync::Arc;

use memory_kernel::domain::ProjectionState;
use memory_kernel::events::{Event, EventDraft, Seq};
use memory_kernel::hashing::canonical_hash;
use memory_kernel::policy::{PolicyEngine, PolicyResult, WriteProposal};
use memory_kernel::projection::Projector;
use memory_kernel::validation::validate_draft;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MemoryError, Result};
use crate::event_log::{event_at, slice_range, EventLog};

/// Rebuild a projection from a sequence of events.
///
/// Returns (final_state, canonical_hash). Pure on the event stream —
/// deterministic by the kernel's guarantee.
pub fn rebuild_state(events: &[Event]) -> (ProjectionState, String) {
    let state = Projector::default().fold(events);
    let hash = canonical_hash(&state);
    (state, hash)
}

/// Rebuild state and return only the canonical hash.
pub fn rebuild_hash(events: &[Event]) -> String {
    let (_, hash) = rebuild_state(events);
    hash
}

/// How much history a counterfactual folds after the injection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationScope {
    /// Events up to `at_seq`, then the injected event.
    #[default]
    UpToInjection,
    /// As above, followed by every real event after `at_seq`.
    FullTimeline,
}

/// A "what if this had happened at `at_seq`" question.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub inject: EventDraft,
    pub at_seq: Seq,
    pub then_test: WriteProposal,
    pub scope: SimulationScope,
}

impl Simulation {
    pub fn new(inject: EventDraft, at_seq: Seq, then_test: WriteProposal) -> Self {
        Self {
            inject,
            at_seq,
            then_test,
            scope: SimulationScope::default(),
        }
    }

    pub fn scope(mut self, scope: SimulationScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Result of folding a synthetic timeline and testing a proposal on it.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterfactualRun {
    pub state: ProjectionState,
    pub result: PolicyResult,
}

/// The synthetic sequence for a simulation: prefix, injected event
/// (seq `SYNTHETIC`, at the logical time of `at_seq`), then optionally
/// the rest of the timeline.
pub fn counterfactual_sequence(events: &[Event], sim: &Simulation) -> Vec<Event> {
    let prefix = slice_range(events, Seq::FIRST, sim.at_seq);
    let logical_time = event_at(events, sim.at_seq).map_or(0, |e| e.logical_time);

    let mut timeline = Vec::with_capacity(events.len() + 1);
    timeline.extend_from_slice(prefix);
    timeline.push(sim.inject.clone().into_event(Seq::SYNTHETIC, logical_time));
    if sim.scope == SimulationScope::FullTimeline {
        timeline.extend_from_slice(&events[prefix.len()..]);
    }
    timeline
}

/// Read-only replay over a shared log.
#[derive(Clone)]
pub struct ReplayEngine {
    log: Arc<EventLog>,
    projector: Projector,
    policy: PolicyEngine,
}

impl ReplayEngine {
    pub fn new(log: Arc<EventLog>) -> Self {
        Self::with_projector(log, Projector::default())
    }

    pub fn with_projector(log: Arc<EventLog>, projector: Projector) -> Self {
        Self {
            log,
            projector,
            policy: PolicyEngine::new(),
        }
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// State as of `seq` (inclusive); `None` folds the whole log.
    /// `Seq(0)` is the empty state before the first event.
    pub fn replay_to(&self, seq: Option<Seq>) -> Result<ProjectionState> {
        let snapshot = self.log.snapshot();
        let tail = Seq(snapshot.len() as u64);
        let to = seq.unwrap_or(tail);
        if to > tail {
            return Err(MemoryError::NotFound(format!(
                "seq {} is beyond the end of the log ({})",
                to, tail
            )));
        }
        debug!(to = %to, "replay_to");
        Ok(self.projector.fold(slice_range(&snapshot, Seq::FIRST, to)))
    }

    /// The whole log with the named events filtered out before folding.
    /// Unknown seqs are ignored; the log is untouched.
    pub fn replay_excluding(&self, excluded: &BTreeSet<Seq>) -> ProjectionState {
        let snapshot = self.log.snapshot();
        debug!(excluded = excluded.len(), "replay_excluding");
        self.projector
            .fold(snapshot.iter().filter(|e| !excluded.contains(&e.seq)))
    }

    /// Fold only the closed range `[from, to]`.
    pub fn replay_range(&self, from: Seq, to: Seq) -> Result<ProjectionState> {
        let snapshot = self.log.snapshot();
        let tail = Seq(snapshot.len() as u64);
        if to > tail {
            return Err(MemoryError::NotFound(format!(
                "seq {} is beyond the end of the log ({})",
                to, tail
            )));
        }
        Ok(self.projector.fold(slice_range(&snapshot, from, to)))
    }

    /// States at two points, for diffing.
    pub fn compare(&self, a: Seq, b: Seq) -> Result<(ProjectionState, ProjectionState)> {
        Ok((self.replay_to(Some(a))?, self.replay_to(Some(b))?))
    }

    /// Fold a synthetic timeline and test a proposal against it.
    /// Never appends to the real log.
    pub fn simulate(&self, sim: &Simulation) -> Result<CounterfactualRun> {
        let snapshot = self.log.snapshot();
        let tail = Seq(snapshot.len() as u64);
        if sim.at_seq > tail {
            return Err(MemoryError::NotFound(format!(
                "cannot inject at seq {}: log ends at {}",
                sim.at_seq, tail
            )));
        }
        validate_draft(&sim.inject, sim.at_seq.next())?;

        let timeline = counterfactual_sequence(&snapshot, sim);
        let state = self.projector.fold(&timeline);
        let result = self.policy.check(&sim.then_test, &state);
        debug!(
            at_seq = %sim.at_seq,
            scope = ?sim.scope,
            allowed = result.allowed,
            "counterfactual evaluated"
        );
        Ok(CounterfactualRun { state, result })
    }
}
