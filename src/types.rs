//! Core types for the Turnloom simulation engine.
//!
//! This module defines the fundamental vocabulary used throughout the system
//! for describing run lifecycle, turn phases, communication scoping, and
//! metric values. These are the domain concepts that define what a run *is*;
//! runtime infrastructure types live in [`crate::runtime`].
//!
//! # Key Types
//!
//! - [`ScenarioStatus`]: Lifecycle state of a run
//! - [`HaltReason`]: Why a run was halted
//! - [`PhaseKind`]: The five fixed stages of turn processing
//! - [`CommKind`]: Scope of a communication exchange
//! - [`MetricValue`]: Numeric, textual, or boolean metric payloads
//!
//! # Examples
//!
//! ```rust
//! use turnloom::types::{PhaseKind, ScenarioStatus, HaltReason};
//!
//! // Phases execute in a fixed order each turn.
//! assert_eq!(PhaseKind::ORDER[0], PhaseKind::Communication);
//! assert_eq!(PhaseKind::ORDER[4], PhaseKind::Persistence);
//!
//! // Statuses encode to stable strings for persistence.
//! let halted = ScenarioStatus::Halted(HaltReason::CreditLimit);
//! assert_eq!(halted.encode(), "Halted:credit_limit");
//! assert_eq!(ScenarioStatus::decode("Halted:credit_limit"), halted);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a scenario run.
///
/// The state machine is:
/// `Created → Running → {Paused ⇄ Running} → {Completed | Halted | Failed}`.
///
/// `Paused` is voluntary and trivially resumable. `Halted` requires an
/// explicit resume that re-validates resumability. `Completed` and `Failed`
/// are terminal and can never be resumed.
///
/// # Persistence
///
/// Statuses support serialization both through serde and through the
/// [`encode`](Self::encode)/[`decode`](Self::decode) string forms used in
/// on-disk run documents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioStatus {
    /// Run constructed but never started.
    Created,
    /// Actively executing turns.
    Running,
    /// Voluntarily suspended at a phase boundary; resume continues in place.
    Paused,
    /// Reached the configured end turn.
    Completed,
    /// Stopped by a halting predicate; resumable after re-validation.
    Halted(HaltReason),
    /// An unrecoverable phase error exhausted its retry budget. Terminal.
    Failed,
}

impl ScenarioStatus {
    /// Encode a status into its persisted string form.
    ///
    /// - `Created` → `"Created"` (and so on for the unit variants)
    /// - `Halted(reason)` → `"Halted:<reason>"`
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            ScenarioStatus::Created => "Created".to_string(),
            ScenarioStatus::Running => "Running".to_string(),
            ScenarioStatus::Paused => "Paused".to_string(),
            ScenarioStatus::Completed => "Completed".to_string(),
            ScenarioStatus::Halted(reason) => format!("Halted:{}", reason.as_str()),
            ScenarioStatus::Failed => "Failed".to_string(),
        }
    }

    /// Decode a persisted string form back into a status.
    ///
    /// Unknown halt reasons decode to [`HaltReason::Error`]; anything else
    /// unrecognized decodes to `Failed` so a corrupt document can never be
    /// mistaken for a resumable run.
    pub fn decode(s: &str) -> Self {
        match s {
            "Created" => ScenarioStatus::Created,
            "Running" => ScenarioStatus::Running,
            "Paused" => ScenarioStatus::Paused,
            "Completed" => ScenarioStatus::Completed,
            "Failed" => ScenarioStatus::Failed,
            other => {
                if let Some(reason) = other.strip_prefix("Halted:") {
                    ScenarioStatus::Halted(HaltReason::from_str_lossy(reason))
                } else {
                    ScenarioStatus::Failed
                }
            }
        }
    }

    /// Returns `true` for `Completed`, `Halted`, and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScenarioStatus::Completed | ScenarioStatus::Halted(_) | ScenarioStatus::Failed
        )
    }

    /// Returns `true` if a run in this status may be resumed.
    ///
    /// `Completed` and `Failed` sources are rejected; everything else
    /// (including `Halted`) is fair game for resume.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        !matches!(self, ScenarioStatus::Completed | ScenarioStatus::Failed)
    }
}

impl fmt::Display for ScenarioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Why a run transitioned to [`ScenarioStatus::Halted`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HaltReason {
    /// Cumulative cost strictly exceeded the configured credit limit.
    CreditLimit,
    /// A phase error was downgraded to a halt rather than a failure.
    Error,
    /// An external cancellation signal was observed at a phase boundary.
    Manual,
}

impl HaltReason {
    /// Stable string form used in encoded statuses and event payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HaltReason::CreditLimit => "credit_limit",
            HaltReason::Error => "error",
            HaltReason::Manual => "manual",
        }
    }

    fn from_str_lossy(s: &str) -> Self {
        match s {
            "credit_limit" => HaltReason::CreditLimit,
            "manual" => HaltReason::Manual,
            _ => HaltReason::Error,
        }
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The five stages of turn processing, executed strictly in [`ORDER`](Self::ORDER).
///
/// A phase with no registered implementation is skipped (with a
/// `PhaseSkipped` event for observability parity), never reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhaseKind {
    /// Inter-actor message exchange.
    Communication,
    /// Concurrent per-actor decision making.
    Decision,
    /// Wholesale replacement of the shared world narrative.
    WorldUpdate,
    /// Structural checks over the turn's outputs.
    Validation,
    /// Durable snapshot of the run document.
    Persistence,
}

impl PhaseKind {
    /// Fixed execution order per turn.
    pub const ORDER: [PhaseKind; 5] = [
        PhaseKind::Communication,
        PhaseKind::Decision,
        PhaseKind::WorldUpdate,
        PhaseKind::Validation,
        PhaseKind::Persistence,
    ];

    /// Encode a phase into its persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            PhaseKind::Communication => "Communication",
            PhaseKind::Decision => "Decision",
            PhaseKind::WorldUpdate => "WorldUpdate",
            PhaseKind::Validation => "Validation",
            PhaseKind::Persistence => "Persistence",
        }
    }

    /// Decode a persisted string form back into a phase, if recognized.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "Communication" => Some(PhaseKind::Communication),
            "Decision" => Some(PhaseKind::Decision),
            "WorldUpdate" => Some(PhaseKind::WorldUpdate),
            "Validation" => Some(PhaseKind::Validation),
            "Persistence" => Some(PhaseKind::Persistence),
            _ => None,
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Scope of a [`Communication`](crate::comms::Communication) exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommKind {
    /// One sender, one recipient.
    Bilateral,
    /// One sender, a named subset of actors.
    Coalition,
    /// Visible to every actor; recipients list is empty.
    Public,
}

impl fmt::Display for CommKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommKind::Bilateral => write!(f, "bilateral"),
            CommKind::Coalition => write!(f, "coalition"),
            CommKind::Public => write!(f, "public"),
        }
    }
}

/// Payload of a [`MetricRecord`](crate::state::MetricRecord).
///
/// Serializes untagged so exported metric documents read naturally
/// (`3.5`, `"stable"`, `true`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Boolean flag.
    Flag(bool),
    /// Numeric measurement.
    Number(f64),
    /// Categorical or free-text measurement.
    Text(String),
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Number(v)
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Flag(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}
