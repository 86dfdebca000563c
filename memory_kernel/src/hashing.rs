/// Memory Kernel v1 — Canonical Hashing
///
/// Deterministic canonical serialization + SHA-256 hashing of a
/// projection. Two folds of the same prefix must hash identically.
///
/// Rules:
///   - Facts sorted by key, constraints sorted by normalized key
///   - Decisions in fold order
///   - Pending verifications sorted
///   - Fixed field order, UTF-8 JSON, no whitespace
///   - Kernel-owned numbers (confidence, seqs) are integers; fact values
///     are hashed as given, floats in their shortest round-trip form

use sha2::{Digest, Sha256};
use serde_json::{Map, Value};

use crate::domain::ProjectionState;
use crate::events::{Event, Seq};
use crate::KERNEL_VERSION;

/// Canonical serialization of a projection to UTF-8 JSON bytes.
/// Includes kernel_version as the first field for identity binding.
pub fn canonical_serialize(state: &ProjectionState) -> Vec<u8> {
    let obj = build_canonical_value(state);
    serde_json::to_vec(&obj).expect("canonical_serialize: JSON serialization failed")
}

/// SHA-256 of the canonical serialization. Lowercase hex string.
pub fn canonical_hash(state: &ProjectionState) -> String {
    hex_digest(&canonical_serialize(state))
}

/// SHA-256 over an event sequence, in order. Used to show a replay
/// touched nothing in the log.
pub fn events_hash(events: &[Event]) -> String {
    let mut hasher = Sha256::new();
    for event in events {
        let bytes = serde_json::to_vec(event).expect("events_hash: JSON serialization failed");
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    to_hex(&hasher.finalize())
}

fn hex_digest(bytes: &[u8]) -> String {
    to_hex(&Sha256::digest(bytes))
}

fn to_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn seq_value(seq: Option<Seq>) -> Value {
    seq.map_or(Value::Null, |s| Value::from(s.get()))
}

/// Field order: kernel_version, last_seq, event_count, facts,
///              constraints, decisions, pending_verifications
fn build_canonical_value(state: &ProjectionState) -> Value {
    // -- facts (BTreeMap: already sorted by key) ---
    let facts: Vec<Value> = state
        .facts
        .values()
        .map(|f| {
            let mut m = Map::new();
            m.insert("key".to_string(), Value::String(f.key.clone()));
            m.insert("value".to_string(), f.value.clone());
            m.insert(
                "confidence".to_string(),
                Value::from(f.confidence.basis_points()),
            );
            m.insert("source_seq".to_string(), Value::from(f.source_seq.get()));
            Value::Object(m)
        })
        .collect();

    let constraints: Vec<Value> = state
        .constraints
        .iter()
        .map(|(key, c)| {
            let mut m = Map::new();
            m.insert("key".to_string(), Value::String(key.clone()));
            m.insert("text".to_string(), Value::String(c.text.clone()));
            m.insert(
                "priority".to_string(),
                Value::String(c.priority.as_str().to_string()),
            );
            m.insert("active".to_string(), Value::Bool(c.active));
            m.insert("source_seq".to_string(), Value::from(c.source_seq.get()));
            m.insert("triggered_by".to_string(), seq_value(c.triggered_by));
            Value::Object(m)
        })
        .collect();

    let decisions: Vec<Value> = state
        .decisions
        .iter()
        .map(|d| {
            let mut m = Map::new();
            m.insert("text".to_string(), Value::String(d.text.clone()));
            m.insert("rationale".to_string(), Value::String(d.rationale.clone()));
            m.insert(
                "references".to_string(),
                Value::Array(d.references.iter().map(|s| Value::from(s.get())).collect()),
            );
            m.insert(
                "status".to_string(),
                Value::String(d.status.as_str().to_string()),
            );
            m.insert(
                "topic".to_string(),
                d.topic.clone().map_or(Value::Null, Value::String),
            );
            m.insert("source_seq".to_string(), Value::from(d.source_seq.get()));
            Value::Object(m)
        })
        .collect();

    let pending: Vec<Value> = state
        .pending_verifications
        .iter()
        .cloned()
        .map(Value::String)
        .collect();

    // kernel_version MUST be first — it is part of the kernel identity.
    let mut root = Map::new();
    root.insert(
        "kernel_version".to_string(),
        Value::from(KERNEL_VERSION as u64),
    );
    root.insert("last_seq".to_string(), Value::from(state.last_seq.get()));
    root.insert("event_count".to_string(), Value::from(state.event_count));
    root.insert("facts".to_string(), Value::Array(facts));
    root.insert("constraints".to_string(), Value::Array(constraints));
    root.insert("decisions".to_string(), Value::Array(decisions));
    root.insert("pending_verifications".to_string(), Value::Array(pending));

    Value::Object(root)
}
