//! Runtime error taxonomy.
//!
//! A blocked decision is not an error: it comes back as a
//! `PolicyResult` inside `DecisionOutcome::Blocked`.

use std::io;

use memory_kernel::error::ValidationError;
use memory_kernel::events::Seq;
use thiserror::Error;

/// Errors raised by the event log itself.
#[derive(Error, Debug)]
pub enum LogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("log advanced past expected tail {expected} (now at {actual})")]
    Stale { expected: Seq, actual: Seq },

    #[error("storage failure: {0}")]
    Storage(#[from] io::Error),

    #[error("corrupted log: {0}")]
    Corrupted(String),
}

/// Errors surfaced to callers of the memory runtime.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("concurrent write conflict after {attempts} attempts (log at seq {last_seen})")]
    ConcurrentWriteConflict { attempts: u32, last_seen: Seq },

    #[error("storage failure: {0}")]
    StorageFailure(#[source] io::Error),

    #[error("corrupted log: {0}")]
    Corrupted(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<LogError> for MemoryError {
    fn from(e: LogError) -> Self {
        match e {
            LogError::Validation(v) => MemoryError::Validation(v),
            LogError::Stale { actual, .. } => MemoryError::ConcurrentWriteConflict {
                attempts: 1,
                last_seen: actual,
            },
            LogError::Storage(io) => MemoryError::StorageFailure(io),
            LogError::Corrupted(msg) => MemoryError::Corrupted(msg),
        }
    }
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;
