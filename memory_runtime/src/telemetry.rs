//! Logging setup for binaries and embedders.
//!
//! The kernel never logs; the runtime emits `tracing` events and the
//! process owner decides whether to install this subscriber.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const DEFAULT_FILTER: &str = "memory_runtime=info";

/// Install a fmt subscriber filtered by `RUST_LOG`.
/// Calling it twice is harmless; the second call is ignored.
pub fn init_logging() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into());
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
