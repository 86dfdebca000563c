/// Golden determinism test — folds the frozen event stream
/// and asserts the canonical hash matches the permanent v1 value.
///
/// This test must NEVER be modified to match new behavior.
/// If it fails, the fold has been broken.

use std::collections::BTreeSet;
use std::fs;

use memory_kernel::domain::{Confidence, DecisionStatus, Priority, ProjectionState};
use memory_kernel::events::{Event, EventDraft, Seq};
use memory_kernel::hashing::{canonical_hash, canonical_serialize};
use memory_kernel::policy::{check, WriteProposal};
use memory_kernel::projection::{fold, Projector};
use memory_kernel::KERNEL_VERSION;

fn load_events(path: &str) -> Vec<Event> {
    let data = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e));
    serde_json::from_str(&data).expect("Failed to parse events JSON")
}

fn load_expected_hash(path: &str) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path, e))
        .trim()
        .to_string()
}

fn golden() -> Vec<Event> {
    load_events("tests/golden/events.json")
}

/// Assign positions to drafts the way the log would.
fn sequence(drafts: Vec<EventDraft>) -> Vec<Event> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, d)| d.into_event(Seq(i as u64 + 1), i as u64 + 1))
        .collect()
}

#[test]
fn golden_fold_hash_matches() {
    let state = fold(&golden());
    let hash = canonical_hash(&state);

    let expected = load_expected_hash("tests/golden/expected_hash.txt");
    assert_eq!(
        hash, expected,
        "GOLDEN TEST FAILED: Kernel v1 fold produced a different hash.\n\
         This means the fold behavior has changed — this is forbidden.\n\
         Got:      {}\n\
         Expected: {}",
        hash, expected
    );
}

#[test]
fn golden_fold_is_deterministic() {
    let events = golden();

    let s1 = fold(&events);
    let s2 = fold(&events);

    assert_eq!(s1, s2);
    assert_eq!(
        canonical_hash(&s1),
        canonical_hash(&s2),
        "DETERMINISM FAILURE: two folds of the same events produced different hashes"
    );
}

#[test]
fn golden_final_state_shape() {
    let state = fold(&golden());

    assert_eq!(state.last_seq, Seq(10));
    assert_eq!(state.event_count, 10);

    let dest = state.fact("destination").expect("destination fact");
    assert_eq!(dest.value, serde_json::json!("Osaka"));
    assert_eq!(dest.source_seq, Seq(7));

    // Deactivated, never removed.
    let eval = state.constraint("Never use  EVAL").expect("kept after deactivation");
    assert!(!eval.active);
    assert_eq!(state.constraints.len(), 3);

    assert_eq!(state.decisions.len(), 1);
    assert_eq!(state.decisions[0].references, BTreeSet::from([Seq(2), Seq(5)]));

    let pending: Vec<&str> = state.pending_verifications.iter().map(String::as_str).collect();
    assert_eq!(pending, vec!["budget", "check"]);
}

#[test]
fn prefix_fold_extends_by_one_event() {
    let events = golden();
    let projector = Projector::default();

    for k in 1..=events.len() {
        let direct = projector.fold(&events[..k]);
        let stepped = projector.apply(&projector.fold(&events[..k - 1]), &events[k - 1]);
        assert_eq!(direct, stepped, "prefix mismatch at seq {}", k);
    }
}

#[test]
fn decision_always_clears_pending_verifications() {
    let events = sequence(vec![
        EventDraft::query_issued("accessibility for wheelchair", Default::default()),
        EventDraft::query_issued("dietary needs and budget", Default::default()),
        EventDraft::decision_made(
            "book Ryokan X",
            "",
            &BTreeSet::new(),
            DecisionStatus::Committed,
            None,
        ),
    ]);

    let before = fold(&events[..2]);
    assert!(before.pending_verifications.len() >= 4);

    let after = fold(&events);
    assert!(after.pending_verifications.is_empty());
}

#[test]
fn malformed_decision_still_clears_pending() {
    let events = sequence(vec![
        EventDraft::query_issued("accessibility", Default::default()),
        EventDraft::new(
            memory_kernel::events::EventKind::DecisionMade,
            serde_json::json!({}),
        ),
    ]);
    let state = fold(&events);
    assert!(state.decisions.is_empty());
    assert!(state.pending_verifications.is_empty());
}

#[test]
fn prohibition_respects_word_boundaries() {
    let events = sequence(vec![EventDraft::constraint_added(
        "never use eval",
        Priority::Required,
        None,
    )]);
    let state = fold(&events);

    assert!(check(&WriteProposal::decision("call eval on the payload"), &state).is_blocked());
    assert!(check(&WriteProposal::decision("evaluate the payload"), &state).allowed);
}

#[test]
fn procedural_gate_is_per_decision() {
    let mut drafts = vec![EventDraft::constraint_added(
        "verify accessibility before booking",
        Priority::Required,
        None,
    )];
    let proposal = WriteProposal::decision("book Ryokan X");

    let state: ProjectionState = fold(&sequence(drafts.clone()));
    assert!(check(&proposal, &state).is_blocked());

    drafts.push(EventDraft::query_issued(
        "what about accessibility?",
        Default::default(),
    ));
    let state = fold(&sequence(drafts.clone()));
    assert!(check(&proposal, &state).allowed);

    drafts.push(EventDraft::decision_made(
        "book Ryokan X",
        "verified",
        &BTreeSet::new(),
        DecisionStatus::Committed,
        Some("accessibility"),
    ));
    let state = fold(&sequence(drafts));
    let result = check(&proposal, &state);
    assert!(result.is_blocked());
    assert_eq!(result.violation.map(|v| v.source_seq), Some(Seq(1)));
}

#[test]
fn float_fact_values_hash_stably() {
    let events = |v: f64| {
        sequence(vec![EventDraft::fact_added(
            "nightly_rate",
            serde_json::json!(v),
            Confidence::FULL,
        )])
    };
    let a = fold(&events(0.1));
    let b = fold(&events(0.1));
    assert_eq!(canonical_hash(&a), canonical_hash(&b));
    assert_ne!(canonical_hash(&a), canonical_hash(&fold(&events(0.2))));

    let bytes = String::from_utf8(canonical_serialize(&a)).expect("utf-8");
    assert!(bytes.contains("\"value\":0.1,"));
}

#[test]
fn kernel_version_is_one() {
    assert_eq!(KERNEL_VERSION, 1, "KERNEL_VERSION must be 1 and never change");
}
