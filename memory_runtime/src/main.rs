//! Replay verification harness.
//!
//! Loads an event log, folds it twice, and prints the event count,
//! last seq and canonical hash. Exits non-zero on divergence or if the
//! log cannot be loaded.
//!
//! Usage: memory_runtime [LOG_PATH]
//! Without a path, the log named by the environment config is used.

use std::path::PathBuf;
use std::process::ExitCode;

use memory_runtime::config::RuntimeConfig;
use memory_runtime::drift::verify_determinism;
use memory_runtime::event_log::EventLog;
use memory_runtime::replay::rebuild_state;
use memory_runtime::telemetry::init_logging;
use tracing::error;

fn main() -> ExitCode {
    init_logging();

    let path = match std::env::args().nth(1) {
        Some(p) => PathBuf::from(p),
        None => match RuntimeConfig::from_env() {
            Ok(cfg) => cfg.log_path(),
            Err(e) => {
                error!(error = %e, "invalid configuration");
                return ExitCode::FAILURE;
            }
        },
    };

    if !path.exists() {
        error!(path = %path.display(), "no event log at path");
        return ExitCode::FAILURE;
    }

    let log = match EventLog::open(&path) {
        Ok(log) => log,
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to load event log");
            return ExitCode::FAILURE;
        }
    };

    let events = log.read_all();
    let (state, hash) = rebuild_state(&events);
    let check = verify_determinism(&events);

    println!("log:        {}", path.display());
    println!("events:     {}", events.len());
    println!("last_seq:   {}", state.last_seq);
    println!("facts:      {}", state.facts.len());
    println!(
        "constraints: {} ({} active)",
        state.constraints.len(),
        state.active_constraints().count()
    );
    println!("decisions:  {}", state.decisions.len());
    println!("hash:       {}", hash);

    if !check.holds() || check.first != hash {
        println!("[FAIL] replays diverged: {} vs {}", check.first, check.second);
        return ExitCode::FAILURE;
    }
    println!("[OK] replay is deterministic");
    ExitCode::SUCCESS
}
