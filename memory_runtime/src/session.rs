//! Memory session — the boundary operations an agent layer calls.
//!
//! Every read re-derives state from a log snapshot. Every write is
//! validated by the kernel before the log sees it.
//!
//! Decision commit order (optimistic concurrency):
//!   1. snapshot the log, note its tail seq
//!   2. fold the snapshot, run the policy check
//!   3. compare-and-append against the noted tail
//!   4. if the log advanced, go to 1 — at most `max_commit_retries` times,
//!      then surface `ConcurrentWriteConflict`

use std::collections::BTreeSet;
use std::sync::Arc;

use memory_kernel::domain::{
    Confidence, ConstraintProjection, DecisionProjection, DecisionStatus, FactProjection,
    Priority, ProjectionState, QueryScope,
};
use memory_kernel::events::{fields, Event, EventDraft, EventKind, Seq};
use memory_kernel::policy::{PolicyEngine, PolicyResult, ProposalItem, Violation, WriteProposal};
use memory_kernel::projection::Projector;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::RuntimeConfig;
use crate::drift::{compare_states, StateDiff};
use crate::error::{LogError, MemoryError, Result};
use crate::event_log::EventLog;
use crate::provenance::{ProvenanceTracer, TraceTarget};
use crate::replay::{ReplayEngine, Simulation};

/// Receipt for `add_fact`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactReceipt {
    pub seq: Seq,
    pub previous_value: Option<Value>,
    /// A prior value existed and differs from the new one.
    pub drift: bool,
}

/// A decision an agent wants to commit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionRequest {
    pub text: String,
    pub rationale: String,
    pub references: BTreeSet<Seq>,
    pub topic: Option<String>,
    pub caused_by: Option<Seq>,
    pub correlation_id: Option<String>,
}

impl DecisionRequest {
    pub fn new(text: &str, rationale: &str) -> Self {
        Self {
            text: text.to_string(),
            rationale: rationale.to_string(),
            ..Default::default()
        }
    }

    pub fn references(mut self, refs: impl IntoIterator<Item = Seq>) -> Self {
        self.references.extend(refs);
        self
    }

    pub fn topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    pub fn caused_by(mut self, seq: Seq) -> Self {
        self.caused_by = Some(seq);
        self
    }

    pub fn correlated(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }

    fn proposal(&self) -> WriteProposal {
        WriteProposal::single(ProposalItem::Decision {
            text: self.text.clone(),
            rationale: self.rationale.clone(),
            topic: self.topic.clone(),
            references: self.references.clone(),
        })
    }

    fn draft(&self, status: DecisionStatus) -> EventDraft {
        let mut draft = EventDraft::decision_made(
            &self.text,
            &self.rationale,
            &self.references,
            status,
            self.topic.as_deref(),
        );
        draft.caused_by = self.caused_by;
        draft.correlation_id = self.correlation_id.clone();
        draft
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecisionOutcome {
    Committed {
        seq: Seq,
        /// Carries advisories from `preferred` constraints.
        result: PolicyResult,
    },
    Blocked {
        result: PolicyResult,
        /// Set when blocked attempts are recorded in the log.
        blocked_seq: Option<Seq>,
    },
}

impl DecisionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, DecisionOutcome::Committed { .. })
    }

    pub fn seq(&self) -> Option<Seq> {
        match self {
            DecisionOutcome::Committed { seq, .. } => Some(*seq),
            DecisionOutcome::Blocked { blocked_seq, .. } => *blocked_seq,
        }
    }

    pub fn policy(&self) -> &PolicyResult {
        match self {
            DecisionOutcome::Committed { result, .. } | DecisionOutcome::Blocked { result, .. } => {
                result
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub query_seq: Seq,
    pub facts: Vec<FactProjection>,
    pub constraints: Vec<ConstraintProjection>,
    pub decisions: Vec<DecisionProjection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeTravel {
    pub viewing_seq: Seq,
    pub current_seq: Seq,
    pub historical_state: ProjectionState,
    pub diff_from_current: StateDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub allowed: bool,
    pub reason: Option<String>,
    pub violation: Option<Violation>,
}

/// One value a fact has held, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRevision {
    pub seq: Seq,
    pub logical_time: u64,
    pub value: Value,
    pub confidence: Confidence,
}

/// Thread-safe handle over one event log. Share it via `Arc`.
pub struct MemorySession {
    log: Arc<EventLog>,
    replay: ReplayEngine,
    tracer: ProvenanceTracer,
    policy: PolicyEngine,
    max_commit_retries: u32,
    record_blocked_decisions: bool,
}

impl MemorySession {
    /// Open the file-backed log named by `config`.
    pub fn open(config: &RuntimeConfig) -> Result<Self> {
        let log = EventLog::open(&config.log_path())?;
        info!(path = %config.log_path().display(), events = log.len(), "memory session opened");
        Ok(Self::with_log(Arc::new(log), config))
    }

    pub fn in_memory() -> Self {
        Self::with_log(Arc::new(EventLog::in_memory()), &RuntimeConfig::default())
    }

    pub fn with_log(log: Arc<EventLog>, config: &RuntimeConfig) -> Self {
        Self::with_projector(log, config, Projector::default())
    }

    /// Use a custom topic extractor through `projector`.
    pub fn with_projector(log: Arc<EventLog>, config: &RuntimeConfig, projector: Projector) -> Self {
        Self {
            replay: ReplayEngine::with_projector(Arc::clone(&log), projector.clone()),
            tracer: ProvenanceTracer::new(Arc::clone(&log), projector),
            log,
            policy: PolicyEngine::new(),
            max_commit_retries: config.max_commit_retries,
            record_blocked_decisions: config.record_blocked_decisions,
        }
    }

    pub fn log(&self) -> &Arc<EventLog> {
        &self.log
    }

    pub fn replay(&self) -> &ReplayEngine {
        &self.replay
    }

    pub fn tracer(&self) -> &ProvenanceTracer {
        &self.tracer
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Append any validated draft as-is.
    pub fn record(&self, draft: EventDraft) -> Result<Seq> {
        Ok(self.log.append(draft)?)
    }

    /// Upsert a fact. Reports the value it replaced, if any.
    pub fn add_fact(&self, key: &str, value: Value, confidence: Confidence) -> Result<FactReceipt> {
        let (seq, previous_value) = self.append_checked(|state| {
            let previous = state.fact(key).map(|f| f.value.clone());
            let draft = EventDraft::fact_added(key, value.clone(), confidence);
            Ok((Some(draft), previous))
        })?;
        let seq = seq.ok_or_else(|| MemoryError::Corrupted("fact append produced no seq".into()))?;

        let drift = previous_value.as_ref().is_some_and(|prev| *prev != value);
        if drift {
            info!(key, seq = %seq, "fact drift");
        }
        Ok(FactReceipt {
            seq,
            previous_value,
            drift,
        })
    }

    /// Add a constraint. `learned` constraints must name the event
    /// that taught them.
    pub fn add_constraint(
        &self,
        text: &str,
        priority: Priority,
        triggered_by: Option<Seq>,
    ) -> Result<Seq> {
        let seq = self
            .log
            .append(EventDraft::constraint_added(text, priority, triggered_by))?;
        debug!(seq = %seq, priority = %priority, "constraint added");
        Ok(seq)
    }

    /// Mark a constraint inactive. It stays in the projection.
    pub fn deactivate_constraint(&self, text: &str) -> Result<Seq> {
        let (seq, ()) = self.append_checked(|state| {
            if state.constraint(text).is_none() {
                return Err(MemoryError::NotFound(format!("no constraint {:?}", text)));
            }
            Ok((Some(EventDraft::constraint_deactivated(text)), ()))
        })?;
        seq.ok_or_else(|| MemoryError::Corrupted("deactivation produced no seq".into()))
    }

    /// Policy check against the current projection. Appends nothing.
    pub fn propose_decision(&self, request: &DecisionRequest) -> Result<PolicyResult> {
        let state = self.context()?;
        Ok(self.policy.check(&request.proposal(), &state))
    }

    /// Check-then-append a decision.
    pub fn record_decision(&self, request: &DecisionRequest) -> Result<DecisionOutcome> {
        let proposal = request.proposal();

        let (seq, result) = self.append_checked(|state| {
            let result = self.policy.check(&proposal, state);
            let draft = result
                .allowed
                .then(|| request.draft(DecisionStatus::Committed));
            Ok((draft, result))
        })?;

        if let Some(seq) = seq {
            debug!(seq = %seq, "decision committed");
            return Ok(DecisionOutcome::Committed { seq, result });
        }

        if let Some(v) = &result.violation {
            warn!(
                constraint = %v.constraint_text,
                constraint_seq = %v.source_seq,
                priority = %v.priority,
                "decision blocked"
            );
        }

        let blocked_seq = if self.record_blocked_decisions {
            Some(self.log.append(request.draft(DecisionStatus::Blocked))?)
        } else {
            None
        };
        Ok(DecisionOutcome::Blocked {
            result,
            blocked_seq,
        })
    }

    /// Optimistic check-then-append. `prepare` sees the state at the tail
    /// it will be appended after; returning no draft skips the append.
    fn append_checked<T>(
        &self,
        mut prepare: impl FnMut(&ProjectionState) -> Result<(Option<EventDraft>, T)>,
    ) -> Result<(Option<Seq>, T)> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let snapshot = self.log.snapshot();
            let tail = Seq(snapshot.len() as u64);
            let state = self.replay.projector().fold(snapshot.iter());
            drop(snapshot);

            let (draft, value) = prepare(&state)?;
            let Some(draft) = draft else {
                return Ok((None, value));
            };

            match self.log.append_if_tail(tail, draft) {
                Ok(seq) => return Ok((Some(seq), value)),
                Err(LogError::Stale { actual, .. }) => {
                    if attempts > self.max_commit_retries {
                        warn!(attempts, last_seen = %actual, "giving up on contended commit");
                        return Err(MemoryError::ConcurrentWriteConflict {
                            attempts,
                            last_seen: actual,
                        });
                    }
                    warn!(attempts, tail = %tail, now = %actual, "log advanced; re-checking");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Search memory. Always appends `MemoryQueryIssued` first so the
    /// verification it grants is reconstructible by replay.
    pub fn query(&self, question: &str, scope: QueryScope) -> Result<QueryResult> {
        let query_seq = self.log.append(EventDraft::query_issued(question, scope))?;
        let state = self.replay.replay_to(Some(query_seq))?;
        let needle = question.to_lowercase();

        let facts = if scope.includes_facts() {
            state
                .facts
                .values()
                .filter(|f| {
                    f.key.to_lowercase().contains(&needle)
                        || value_text(&f.value).to_lowercase().contains(&needle)
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let constraints = if scope.includes_constraints() {
            state
                .constraints
                .values()
                .filter(|c| c.text.to_lowercase().contains(&needle))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let decisions = if scope.includes_decisions() {
            state
                .decisions
                .iter()
                .filter(|d| d.text.to_lowercase().contains(&needle))
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        debug!(query_seq = %query_seq, pending = state.pending_verifications.len(), "query issued");
        Ok(QueryResult {
            query_seq,
            facts,
            constraints,
            decisions,
        })
    }

    /// Current projection.
    pub fn context(&self) -> Result<ProjectionState> {
        self.replay.replay_to(None)
    }

    pub fn trace(&self, target: impl Into<TraceTarget>) -> Result<Vec<Event>> {
        self.tracer.trace(&target.into())
    }

    /// State as of `seq`, and how the present differs from it.
    pub fn time_travel(&self, seq: Seq) -> Result<TimeTravel> {
        let snapshot_tail = self.log.last_seq();
        if seq.is_synthetic() || seq > snapshot_tail {
            return Err(MemoryError::NotFound(format!("no event with seq {}", seq)));
        }
        let (historical_state, current) = self.replay.compare(seq, snapshot_tail)?;
        Ok(TimeTravel {
            viewing_seq: seq,
            current_seq: current.last_seq,
            diff_from_current: compare_states(&historical_state, &current),
            historical_state,
        })
    }

    /// Would `proposed_decision` have been allowed had this constraint
    /// existed right after `at_seq`? Never writes to the log.
    pub fn simulate(
        &self,
        inject_constraint: &str,
        at_seq: Seq,
        proposed_decision: &str,
        priority: Priority,
    ) -> Result<SimulationOutcome> {
        // A learned constraint is attributed to the event it is injected after.
        let triggered_by =
            (priority == Priority::Learned && !at_seq.is_synthetic()).then_some(at_seq);
        let sim = Simulation::new(
            EventDraft::constraint_added(inject_constraint, priority, triggered_by),
            at_seq,
            WriteProposal::decision(proposed_decision),
        );
        self.simulate_with(&sim)
    }

    pub fn simulate_with(&self, sim: &Simulation) -> Result<SimulationOutcome> {
        let run = self.replay.simulate(sim)?;
        Ok(SimulationOutcome {
            allowed: run.result.allowed,
            reason: run.result.reason(),
            violation: run.result.violation,
        })
    }

    /// Every value `key` has held, from the log.
    pub fn fact_history(&self, key: &str) -> Vec<FactRevision> {
        self.log
            .read_by_kind(EventKind::FactAdded)
            .into_iter()
            .filter(|e| e.payload_str(fields::KEY) == Some(key))
            .map(|e| FactRevision {
                seq: e.seq,
                logical_time: e.logical_time,
                value: e.payload.get(fields::VALUE).cloned().unwrap_or(Value::Null),
                confidence: Confidence::from_payload(e.payload.get(fields::CONFIDENCE)),
            })
            .collect()
    }
}

fn value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
