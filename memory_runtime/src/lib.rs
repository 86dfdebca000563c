#![forbid(unsafe_code)]

//! Memory Kernel v1 — Rust Runtime
//!
//! Wraps the pure kernel with a durable event log, replay,
//! provenance tracing, drift detection and the session facade.
//!
//! No fold or policy logic lives here — all state derivation and
//! constraint evaluation are delegated to the kernel.

pub mod error;
pub mod config;
pub mod telemetry;
pub mod proto_types;
pub mod proto_bridge;
pub mod event_store;
pub mod event_log;
pub mod replay;
pub mod provenance;
pub mod drift;
pub mod session;
