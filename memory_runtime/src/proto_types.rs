//! Hand-written protobuf types for the on-disk event frames.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Field numbers are part of the log format and never change.

use prost::Message;

// ── Event ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoEvent {
    #[prost(uint64, tag = "1")]
    pub seq: u64,
    #[prost(uint64, tag = "2")]
    pub logical_time: u64,
    #[prost(enumeration = "ProtoEventKind", tag = "3")]
    pub kind: i32,
    /// Payload as compact JSON, key order preserved.
    #[prost(string, tag = "4")]
    pub payload_json: String,
    #[prost(uint64, optional, tag = "5")]
    pub caused_by: Option<u64>,
    #[prost(string, optional, tag = "6")]
    pub correlation_id: Option<String>,
}

// ── Kind ───────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoEventKind {
    Unspecified = 0,
    FactAdded = 1,
    ConstraintAdded = 2,
    ConstraintDeactivated = 3,
    DecisionMade = 4,
    MemoryQueryIssued = 5,
}
