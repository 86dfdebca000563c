//! Kernel error types.
//!
//! The fold itself never fails. Only proposal-time validation
//! produces errors.

use thiserror::Error;

use crate::events::{EventKind, Seq};

/// A malformed draft, rejected before it can reach the log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("learned constraints require 'triggered_by'")]
    LearnedWithoutTrigger,

    #[error("triggered_by={triggered_by} must reference an earlier event (next seq is {next_seq})")]
    TriggerNotEarlier { triggered_by: Seq, next_seq: Seq },

    #[error("caused_by={caused_by} must reference an earlier event (next seq is {next_seq})")]
    CauseNotEarlier { caused_by: Seq, next_seq: Seq },

    #[error("{kind} payload is missing required field '{field}'")]
    MissingField { kind: EventKind, field: &'static str },

    #[error("{kind} payload must be a JSON object")]
    PayloadNotObject { kind: EventKind },

    #[error("confidence {0} exceeds 1.0 (10000 basis points)")]
    ConfidenceOutOfRange(u32),

    #[error("unknown priority {0:?}")]
    UnknownPriority(String),
}
