/// Memory Kernel v1 — Core Domain Types
///
/// Pure data. No fold logic.
/// Confidence is fixed-point basis points (SCALE = 10_000), no float in state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::Seq;

/// Fixed-point scale for confidence: 10_000 == 1.0.
pub const CONFIDENCE_SCALE: u32 = 10_000;

// ── Enumerations ───────────────────────────────────────────────────

/// Enforcement class of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Required,
    Preferred,
    Learned,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Required => "required",
            Priority::Preferred => "preferred",
            Priority::Learned => "learned",
        }
    }

    /// `required` and `learned` block on violation; `preferred` only advises.
    pub fn is_blocking(self) -> bool {
        !matches!(self, Priority::Preferred)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "required" => Ok(Priority::Required),
            "preferred" => Ok(Priority::Preferred),
            "learned" => Ok(Priority::Learned),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    Committed,
    Blocked,
}

impl DecisionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionStatus::Committed => "committed",
            DecisionStatus::Blocked => "blocked",
        }
    }

    fn parse_lenient(s: &str) -> Self {
        if s.eq_ignore_ascii_case("blocked") {
            DecisionStatus::Blocked
        } else {
            DecisionStatus::Committed
        }
    }
}

/// Which part of the projection a query searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryScope {
    #[default]
    All,
    Facts,
    Constraints,
    Decisions,
}

impl QueryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryScope::All => "all",
            QueryScope::Facts => "facts",
            QueryScope::Constraints => "constraints",
            QueryScope::Decisions => "decisions",
        }
    }

    pub fn includes_facts(self) -> bool {
        matches!(self, QueryScope::All | QueryScope::Facts)
    }

    pub fn includes_constraints(self) -> bool {
        matches!(self, QueryScope::All | QueryScope::Constraints)
    }

    pub fn includes_decisions(self) -> bool {
        matches!(self, QueryScope::All | QueryScope::Decisions)
    }
}

// ── Confidence ─────────────────────────────────────────────────────

/// Confidence in a fact, in basis points of certainty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(u32);

impl Confidence {
    pub const FULL: Confidence = Confidence(CONFIDENCE_SCALE);

    /// Caller-facing constructor. Values above 1.0 are kept as-is so
    /// validation can reject them.
    pub fn from_basis_points(bp: u32) -> Self {
        Confidence(bp)
    }

    pub fn basis_points(self) -> u32 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 <= CONFIDENCE_SCALE
    }

    /// Read a payload value: integers are basis points, floats are a
    /// ratio in [0, 1]. Anything else is full confidence. Clamped.
    pub fn from_payload(v: Option<&Value>) -> Self {
        let bp = match v {
            Some(Value::Number(n)) => match n.as_u64() {
                Some(int) => int.min(CONFIDENCE_SCALE as u64) as u32,
                None => {
                    let ratio = n.as_f64().unwrap_or(1.0).clamp(0.0, 1.0);
                    (ratio * CONFIDENCE_SCALE as f64).round() as u32
                }
            },
            _ => CONFIDENCE_SCALE,
        };
        Confidence(bp)
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::FULL
    }
}

// ── Projection entries ─────────────────────────────────────────────

/// Latest value of a fact. Prior values live only in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactProjection {
    pub key: String,
    pub value: Value,
    pub confidence: Confidence,
    pub source_seq: Seq,
}

/// A behavioural constraint. Never removed, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintProjection {
    pub text: String,
    pub priority: Priority,
    pub active: bool,
    pub source_seq: Seq,
    pub triggered_by: Option<Seq>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionProjection {
    pub text: String,
    pub rationale: String,
    pub references: BTreeSet<Seq>,
    pub status: DecisionStatus,
    pub topic: Option<String>,
    pub source_seq: Seq,
}

impl DecisionProjection {
    pub(crate) fn status_from_payload(v: Option<&str>) -> DecisionStatus {
        v.map(DecisionStatus::parse_lenient)
            .unwrap_or(DecisionStatus::Committed)
    }
}

/// State derived from an event prefix. Never the source of truth.
///
/// Ordered containers only, so equal prefixes give byte-identical
/// serializations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectionState {
    pub facts: BTreeMap<String, FactProjection>,
    /// Keyed by normalized constraint text.
    pub constraints: BTreeMap<String, ConstraintProjection>,
    pub decisions: Vec<DecisionProjection>,
    pub pending_verifications: BTreeSet<String>,
    /// Highest real seq folded so far.
    pub last_seq: Seq,
    /// Number of events folded, synthetic ones included.
    pub event_count: u64,
}

impl ProjectionState {
    pub fn active_constraints(&self) -> impl Iterator<Item = (&String, &ConstraintProjection)> {
        self.constraints.iter().filter(|(_, c)| c.active)
    }

    pub fn fact(&self, key: &str) -> Option<&FactProjection> {
        self.facts.get(key)
    }

    /// Look up a constraint by any spelling of its text.
    pub fn constraint(&self, text: &str) -> Option<&ConstraintProjection> {
        self.constraints.get(&normalize_constraint_key(text))
    }

    pub fn is_verified(&self, token: &str) -> bool {
        self.pending_verifications.contains(token)
    }
}

/// Normalized map key for constraint text: trimmed, whitespace
/// collapsed, lowercased.
pub fn normalize_constraint_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
