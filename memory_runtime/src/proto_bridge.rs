//! Proto ↔ Kernel conversion bridge.
//!
//! Converts between the protobuf frame type (proto_types.rs) and the
//! kernel's `Event` (which carries a serde_json::Value payload).
//!
//! Decoding never guesses: an unknown kind or unparseable payload is
//! corruption, and the log refuses to open.

use memory_kernel::events::{Event, EventKind, Seq};
use serde_json::Value;

use crate::error::LogError;
use crate::proto_types::{ProtoEvent, ProtoEventKind};

fn kind_to_proto(kind: EventKind) -> ProtoEventKind {
    match kind {
        EventKind::FactAdded => ProtoEventKind::FactAdded,
        EventKind::ConstraintAdded => ProtoEventKind::ConstraintAdded,
        EventKind::ConstraintDeactivated => ProtoEventKind::ConstraintDeactivated,
        EventKind::DecisionMade => ProtoEventKind::DecisionMade,
        EventKind::MemoryQueryIssued => ProtoEventKind::MemoryQueryIssued,
    }
}

fn kind_from_proto(raw: i32, seq: u64) -> Result<EventKind, LogError> {
    match ProtoEventKind::try_from(raw) {
        Ok(ProtoEventKind::FactAdded) => Ok(EventKind::FactAdded),
        Ok(ProtoEventKind::ConstraintAdded) => Ok(EventKind::ConstraintAdded),
        Ok(ProtoEventKind::ConstraintDeactivated) => Ok(EventKind::ConstraintDeactivated),
        Ok(ProtoEventKind::DecisionMade) => Ok(EventKind::DecisionMade),
        Ok(ProtoEventKind::MemoryQueryIssued) => Ok(EventKind::MemoryQueryIssued),
        Ok(ProtoEventKind::Unspecified) | Err(_) => Err(LogError::Corrupted(format!(
            "event seq={} has unknown kind {}",
            seq, raw
        ))),
    }
}

/// Convert a kernel event to its protobuf frame.
pub fn event_to_proto(event: &Event) -> ProtoEvent {
    ProtoEvent {
        seq: event.seq.get(),
        logical_time: event.logical_time,
        kind: kind_to_proto(event.kind) as i32,
        payload_json: event.payload.to_string(),
        caused_by: event.caused_by.map(Seq::get),
        correlation_id: event.correlation_id.clone(),
    }
}

/// Convert a protobuf frame back into a kernel event.
pub fn proto_to_event(proto: &ProtoEvent) -> Result<Event, LogError> {
    let kind = kind_from_proto(proto.kind, proto.seq)?;
    let payload: Value = serde_json::from_str(&proto.payload_json).map_err(|e| {
        LogError::Corrupted(format!("event seq={} payload is not JSON: {}", proto.seq, e))
    })?;

    Ok(Event {
        seq: Seq(proto.seq),
        logical_time: proto.logical_time,
        kind,
        payload,
        caused_by: proto.caused_by.map(Seq),
        correlation_id: proto.correlation_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory_kernel::domain::Confidence;
    use memory_kernel::events::EventDraft;
    use serde_json::json;

    #[test]
    fn test_payload_key_order_survives_frame() {
        let event = EventDraft::fact_added("hotel", json!({"z": 1, "a": 2}), Confidence::FULL)
            .caused_by(Seq(1))
            .correlated("turn-7")
            .into_event(Seq(2), 2);

        let back = proto_to_event(&event_to_proto(&event)).expect("decode");
        assert_eq!(back, event);
        assert_eq!(back.payload.to_string(), event.payload.to_string());
    }

    #[test]
    fn test_unknown_kind_is_corruption() {
        let proto = ProtoEvent {
            seq: 1,
            logical_time: 1,
            kind: 42,
            payload_json: "{}".to_string(),
            caused_by: None,
            correlation_id: None,
        };
        assert!(matches!(proto_to_event(&proto), Err(LogError::Corrupted(_))));
    }
}
