//! The Event Log — the only mutable shared resource.
//!
//! Readers take immutable snapshots (`Arc<Vec<Event>>`) and never block
//! one another. A single writer mutex serializes sequence assignment and
//! persistence, so two appends can never receive the same seq and no seq
//! is skipped. An event is published to readers only after the backend
//! reports it durable.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use memory_kernel::events::{Event, EventDraft, EventKind, Seq};
use memory_kernel::validation::validate_draft;
use tracing::{debug, info, warn};

use crate::error::LogError;
use crate::event_store::{FileBackend, LogBackend, MemoryBackend};

/// Immutable view of the log at one point in time.
pub type LogSnapshot = Arc<Vec<Event>>;

pub struct EventLog {
    events: RwLock<LogSnapshot>,
    writer: Mutex<Box<dyn LogBackend>>,
}

impl EventLog {
    /// Open (or create) a file-backed log and recover its events.
    pub fn open(path: &Path) -> Result<Self, LogError> {
        let backend = FileBackend::open(path)?;
        let log = Self::with_backend(Box::new(backend))?;
        info!(path = %path.display(), last_seq = %log.last_seq(), "event log opened");
        Ok(log)
    }

    /// A log that lives only as long as this handle.
    pub fn in_memory() -> Self {
        Self {
            events: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(Box::new(MemoryBackend)),
        }
    }

    /// Recover from any backend. Fails closed on gaps or forward causes.
    pub fn with_backend(mut backend: Box<dyn LogBackend>) -> Result<Self, LogError> {
        let events = backend.load()?;
        for (i, event) in events.iter().enumerate() {
            let expected = Seq(i as u64 + 1);
            if event.seq != expected {
                return Err(LogError::Corrupted(format!(
                    "sequence gap: expected {}, got {}",
                    expected, event.seq
                )));
            }
            if let Some(cause) = event.caused_by {
                if cause.is_synthetic() || cause >= event.seq {
                    return Err(LogError::Corrupted(format!(
                        "event {} is caused_by {}, which is not earlier",
                        event.seq, cause
                    )));
                }
            }
        }
        Ok(Self {
            events: RwLock::new(Arc::new(events)),
            writer: Mutex::new(backend),
        })
    }

    /// Validate, assign the next seq, persist, then publish.
    pub fn append(&self, draft: EventDraft) -> Result<Seq, LogError> {
        let mut backend = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.append_locked(&mut **backend, draft)
    }

    /// Compare-and-append: commit only if the tail is still `expected`.
    pub fn append_if_tail(&self, expected: Seq, draft: EventDraft) -> Result<Seq, LogError> {
        let mut backend = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = self.last_seq();
        if actual != expected {
            warn!(expected = %expected, actual = %actual, "stale append rejected");
            return Err(LogError::Stale { expected, actual });
        }
        self.append_locked(&mut **backend, draft)
    }

    /// Caller must hold the writer lock.
    fn append_locked(&self, backend: &mut dyn LogBackend, draft: EventDraft) -> Result<Seq, LogError> {
        let snapshot = self.snapshot();
        let seq = Seq(snapshot.len() as u64 + 1);
        validate_draft(&draft, seq)?;

        let logical_time = snapshot.last().map_or(0, |e| e.logical_time) + 1;
        let event = draft.into_event(seq, logical_time);
        drop(snapshot);

        backend.persist(&event)?;

        let kind = event.kind;
        let mut published = self.events.write().unwrap_or_else(PoisonError::into_inner);
        Arc::make_mut(&mut *published).push(event);
        debug!(seq = %seq, kind = %kind, "event appended");
        Ok(seq)
    }

    // ── Reads ──────────────────────────────────────────────────

    /// The whole log as of now. Later appends are not visible in it.
    pub fn snapshot(&self) -> LogSnapshot {
        Arc::clone(&*self.events.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn last_seq(&self) -> Seq {
        Seq(self.len() as u64)
    }

    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, seq: Seq) -> Option<Event> {
        event_at(&self.snapshot(), seq).cloned()
    }

    /// Events in the closed range `[from, to]`, ascending.
    pub fn read(&self, from: Seq, to: Seq) -> Vec<Event> {
        slice_range(&self.snapshot(), from, to).to_vec()
    }

    pub fn read_all(&self) -> Vec<Event> {
        self.snapshot().as_ref().clone()
    }

    /// The prefix `[1, seq]`.
    pub fn read_through(&self, seq: Seq) -> Vec<Event> {
        self.read(Seq::FIRST, seq)
    }

    pub fn read_by_correlation(&self, correlation_id: &str) -> Vec<Event> {
        self.snapshot()
            .iter()
            .filter(|e| e.correlation_id.as_deref() == Some(correlation_id))
            .cloned()
            .collect()
    }

    /// Events directly caused by `seq`.
    pub fn caused_by(&self, seq: Seq) -> Vec<Event> {
        self.snapshot()
            .iter()
            .filter(|e| e.caused_by == Some(seq))
            .cloned()
            .collect()
    }

    pub fn read_by_kind(&self, kind: EventKind) -> Vec<Event> {
        self.snapshot()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

/// Event at `seq` in a gapless snapshot.
pub fn event_at(events: &[Event], seq: Seq) -> Option<&Event> {
    let index = usize::try_from(seq.get()).ok()?.checked_sub(1)?;
    events.get(index)
}

/// The closed range `[from, to]` of a gapless snapshot, clamped to it.
pub fn slice_range(events: &[Event], from: Seq, to: Seq) -> &[Event] {
    let index = |seq: Seq| usize::try_from(seq.get()).unwrap_or(usize::MAX);
    let start = index(from).max(1) - 1;
    let end = index(to).min(events.len());
    if start >= end {
        return &[];
    }
    &events[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_kernel::domain::Confidence;
    use serde_json::json;

    fn fact(key: &str) -> EventDraft {
        EventDraft::fact_added(key, json!(key), Confidence::FULL)
    }

    #[test]
    fn test_range_is_closed_and_clamped() {
        let log = EventLog::in_memory();
        for k in ["a", "b", "c", "d"] {
            log.append(fact(k)).expect("append");
        }
        let seqs: Vec<u64> = log.read(Seq(2), Seq(3)).iter().map(|e| e.seq.get()).collect();
        assert_eq!(seqs, vec![2, 3]);
        assert_eq!(log.read(Seq(0), Seq(99)).len(), 4);
        assert!(log.read(Seq(3), Seq(2)).is_empty());
    }

    #[test]
    fn test_out_of_range_seqs_never_alias() {
        let log = EventLog::in_memory();
        for k in ["a", "b", "c"] {
            log.append(fact(k)).expect("append");
        }
        let events = log.read_all();
        assert!(event_at(&events, Seq(0)).is_none());
        assert!(event_at(&events, Seq(4)).is_none());
        assert!(event_at(&events, Seq(u64::MAX)).is_none());
        assert!(slice_range(&events, Seq(5), Seq(9)).is_empty());
        assert!(slice_range(&events, Seq(u64::MAX), Seq(u64::MAX)).is_empty());
        assert_eq!(slice_range(&events, Seq(2), Seq(u64::MAX)).len(), 2);
    }

    #[test]
    fn test_snapshot_is_stable_across_appends() {
        let log = EventLog::in_memory();
        log.append(fact("a")).expect("append");
        let before = log.snapshot();
        log.append(fact("b")).expect("append");
        assert_eq!(before.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
