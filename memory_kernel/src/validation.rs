/// Memory Kernel v1 — Draft Validation
///
/// Proposal-time checks. A draft that fails here never reaches the log.
/// The fold tolerates anything; this is where malformed input is refused.

use serde_json::{Map, Value};

use crate::domain::{Priority, CONFIDENCE_SCALE};
use crate::error::ValidationError;
use crate::events::{fields, EventDraft, EventKind, Seq};

/// Validate a draft that would be appended at `next_seq`.
pub fn validate_draft(draft: &EventDraft, next_seq: Seq) -> Result<(), ValidationError> {
    let kind = draft.kind;
    let payload = draft
        .payload
        .as_object()
        .ok_or(ValidationError::PayloadNotObject { kind })?;

    if let Some(caused_by) = draft.caused_by {
        if !is_earlier(caused_by, next_seq) {
            return Err(ValidationError::CauseNotEarlier { caused_by, next_seq });
        }
    }

    match kind {
        EventKind::FactAdded => {
            require_text(payload, kind, fields::KEY)?;
            validate_confidence(payload.get(fields::CONFIDENCE))
        }
        EventKind::ConstraintAdded => {
            require_text(payload, kind, fields::TEXT)?;
            let priority = match payload.get(fields::PRIORITY) {
                None | Some(Value::Null) => Priority::default(),
                Some(Value::String(s)) => s
                    .parse::<Priority>()
                    .map_err(ValidationError::UnknownPriority)?,
                Some(other) => return Err(ValidationError::UnknownPriority(other.to_string())),
            };
            let triggered_by = match payload.get(fields::TRIGGERED_BY) {
                None | Some(Value::Null) => None,
                Some(v) => Some(Seq(v.as_u64().unwrap_or(0))),
            };
            match triggered_by {
                None if priority == Priority::Learned => Err(ValidationError::LearnedWithoutTrigger),
                Some(t) if !is_earlier(t, next_seq) => Err(ValidationError::TriggerNotEarlier {
                    triggered_by: t,
                    next_seq,
                }),
                _ => Ok(()),
            }
        }
        EventKind::ConstraintDeactivated | EventKind::DecisionMade => {
            require_text(payload, kind, fields::TEXT)
        }
        EventKind::MemoryQueryIssued => require_text(payload, kind, fields::QUESTION),
    }
}

/// A reference must point at a real, already-assigned seq.
fn is_earlier(reference: Seq, next_seq: Seq) -> bool {
    !reference.is_synthetic() && reference < next_seq
}

fn require_text(
    payload: &Map<String, Value>,
    kind: EventKind,
    field: &'static str,
) -> Result<(), ValidationError> {
    match payload.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(ValidationError::MissingField { kind, field }),
    }
}

fn validate_confidence(v: Option<&Value>) -> Result<(), ValidationError> {
    let Some(Value::Number(n)) = v else {
        return Ok(());
    };
    let bp = match n.as_u64() {
        Some(int) => int,
        None => {
            let ratio = n.as_f64().unwrap_or(0.0).max(0.0);
            (ratio * CONFIDENCE_SCALE as f64).round() as u64
        }
    };
    if bp > CONFIDENCE_SCALE as u64 {
        return Err(ValidationError::ConfidenceOutOfRange(
            bp.min(u32::MAX as u64) as u32,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confidence;
    use serde_json::json;

    #[test]
    fn test_learned_requires_trigger() {
        let draft = EventDraft::constraint_added("never again", Priority::Learned, None);
        assert_eq!(
            validate_draft(&draft, Seq(5)),
            Err(ValidationError::LearnedWithoutTrigger)
        );

        let draft = EventDraft::constraint_added("never again", Priority::Learned, Some(Seq(4)));
        assert_eq!(validate_draft(&draft, Seq(5)), Ok(()));
    }

    #[test]
    fn test_trigger_must_be_strictly_earlier() {
        let draft = EventDraft::constraint_added("x required", Priority::Learned, Some(Seq(5)));
        assert_eq!(
            validate_draft(&draft, Seq(5)),
            Err(ValidationError::TriggerNotEarlier {
                triggered_by: Seq(5),
                next_seq: Seq(5)
            })
        );
    }

    #[test]
    fn test_caused_by_rejects_self_forward_and_zero() {
        let base = EventDraft::fact_added("k", json!(1), Confidence::FULL);
        for bad in [Seq(0), Seq(3), Seq(4)] {
            let draft = base.clone().caused_by(bad);
            assert!(matches!(
                validate_draft(&draft, Seq(3)),
                Err(ValidationError::CauseNotEarlier { .. })
            ));
        }
        assert!(validate_draft(&base.caused_by(Seq(2)), Seq(3)).is_ok());
    }

    #[test]
    fn test_shape_errors() {
        let empty_key = EventDraft::fact_added("", json!(1), Confidence::FULL);
        assert_eq!(
            validate_draft(&empty_key, Seq(1)),
            Err(ValidationError::MissingField {
                kind: EventKind::FactAdded,
                field: fields::KEY
            })
        );

        let not_object = EventDraft::new(EventKind::DecisionMade, json!("book it"));
        assert_eq!(
            validate_draft(&not_object, Seq(1)),
            Err(ValidationError::PayloadNotObject {
                kind: EventKind::DecisionMade
            })
        );

        let too_sure = EventDraft::fact_added("k", json!(1), Confidence::from_basis_points(10_001));
        assert_eq!(
            validate_draft(&too_sure, Seq(1)),
            Err(ValidationError::ConfidenceOutOfRange(10_001))
        );
    }

    #[test]
    fn test_unknown_priority_rejected() {
        let draft = EventDraft::new(
            EventKind::ConstraintAdded,
            json!({ "text": "never x", "priority": "urgent" }),
        );
        assert_eq!(
            validate_draft(&draft, Seq(1)),
            Err(ValidationError::UnknownPriority("urgent".to_string()))
        );
    }
}
