#![forbid(unsafe_code)]

//! Memory Kernel v1 — pure event fold, constraint policy and hashing.
//!
//! No I/O lives here. Every piece of state is derived by folding an
//! ordered event prefix; persistence and replay orchestration belong
//! to the runtime crate.

/// Kernel v1. Changes to fold semantics require a new kernel version.
pub const KERNEL_VERSION: u32 = 1;

pub mod error;
pub mod events;
pub mod domain;
pub mod topics;
pub mod projection;
pub mod matchers;
pub mod policy;
pub mod validation;
pub mod hashing;
