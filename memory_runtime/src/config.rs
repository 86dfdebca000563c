//! Runtime configuration.
//!
//! Defaults, then an optional JSON file, then environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};

pub const ENV_DATA_DIR: &str = "MEMORY_DATA_DIR";
pub const ENV_COMMIT_RETRIES: &str = "MEMORY_COMMIT_RETRIES";
pub const ENV_RECORD_BLOCKED: &str = "MEMORY_RECORD_BLOCKED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub log_file_name: String,
    /// Re-checks allowed when the log advances under a pending commit.
    pub max_commit_retries: u32,
    /// Log blocked decision attempts as `DecisionMade {status: blocked}`.
    pub record_blocked_decisions: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("memory_data"),
            log_file_name: "events.log".to_string(),
            max_commit_retries: 3,
            record_blocked_decisions: false,
        }
    }
}

impl RuntimeConfig {
    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join(&self.log_file_name)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| MemoryError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&data)
            .map_err(|e| MemoryError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup(ENV_COMMIT_RETRIES) {
            self.max_commit_retries = raw.trim().parse().map_err(|_| {
                MemoryError::Config(format!("{}={:?} is not a retry count", ENV_COMMIT_RETRIES, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_RECORD_BLOCKED) {
            self.record_blocked_decisions = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(MemoryError::Config(format!(
                        "{}={:?} is not a boolean",
                        ENV_RECORD_BLOCKED, raw
                    )))
                }
            };
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: RuntimeConfig =
            serde_json::from_str(r#"{"max_commit_retries": 7}"#).expect("parse");
        assert_eq!(cfg.max_commit_retries, 7);
        assert_eq!(cfg.log_file_name, "events.log");
        assert!(!cfg.record_blocked_decisions);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = RuntimeConfig::default()
            .with_overrides(lookup(&[
                (ENV_DATA_DIR, "/tmp/agent"),
                (ENV_COMMIT_RETRIES, "5"),
                (ENV_RECORD_BLOCKED, "yes"),
            ]))
            .expect("overrides");
        assert_eq!(cfg.log_path(), PathBuf::from("/tmp/agent/events.log"));
        assert_eq!(cfg.max_commit_retries, 5);
        assert!(cfg.record_blocked_decisions);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let err = RuntimeConfig::default()
            .with_overrides(lookup(&[(ENV_COMMIT_RETRIES, "many")]))
            .unwrap_err();
        assert!(matches!(err, MemoryError::Config(_)));
    }
}
