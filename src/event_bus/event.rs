use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::types::{HaltReason, PhaseKind};

/// An observability event emitted during run execution.
///
/// Every event carries `run_id` as its correlation id, so events from
/// concurrent runs sharing one bus remain distinguishable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunEvent {
    /// Correlation id: always the run id of the emitting run.
    pub run_id: String,
    /// Emission time.
    pub at: DateTime<Utc>,
    /// What happened.
    pub kind: EventKind,
}

impl RunEvent {
    pub fn new(run_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            at: Utc::now(),
            kind,
        }
    }

    /// The subscription topic this event belongs to.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        self.kind.topic()
    }

    /// Convert the event to a structured JSON value with normalized schema.
    ///
    /// ```json
    /// {
    ///   "run_id": "run-...",
    ///   "topic": "turn_started",
    ///   "timestamp": "2026-08-05T12:34:56.789Z",
    ///   "payload": { /* variant fields */ }
    /// }
    /// ```
    pub fn to_json_value(&self) -> Value {
        json!({
            "run_id": self.run_id,
            "topic": self.topic().as_str(),
            "timestamp": self.at.to_rfc3339(),
            "payload": serde_json::to_value(&self.kind).unwrap_or(Value::Null),
        })
    }
}

impl fmt::Display for RunEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.run_id, self.kind)
    }
}

/// Enumerated event payloads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A turn began executing.
    TurnStarted { turn: u64 },
    /// A turn finished all of its phases.
    TurnCompleted { turn: u64 },
    /// A registered phase ran to completion.
    PhaseCompleted { phase: PhaseKind, turn: u64 },
    /// An unregistered phase was skipped (observability parity).
    PhaseSkipped { phase: PhaseKind, turn: u64 },
    /// A billed call produced a ledger entry.
    CostIncurred {
        actor: Option<String>,
        phase: PhaseKind,
        model: String,
        cost: f64,
    },
    /// Cumulative spend approached the credit limit.
    CreditWarning { spent: f64, limit: f64 },
    /// A structural validation check flagged the turn's output.
    ValidationIssue {
        turn: u64,
        actor: Option<String>,
        message: String,
    },
    /// An actor's decision was merged into state.
    DecisionRecorded {
        actor: String,
        turn: u64,
        degraded: bool,
    },
    /// The run halted.
    ScenarioHalted { reason: HaltReason, turn: u64 },
    /// The run reached its configured end turn.
    ScenarioFinished { turn: u64 },
    /// A phase error exhausted its retry budget.
    ScenarioFailed { turn: u64, error: String },
}

impl EventKind {
    /// The fieldless discriminant used for per-type subscription.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            EventKind::TurnStarted { .. } => EventTopic::TurnStarted,
            EventKind::TurnCompleted { .. } => EventTopic::TurnCompleted,
            EventKind::PhaseCompleted { .. } => EventTopic::PhaseCompleted,
            EventKind::PhaseSkipped { .. } => EventTopic::PhaseSkipped,
            EventKind::CostIncurred { .. } => EventTopic::CostIncurred,
            EventKind::CreditWarning { .. } => EventTopic::CreditWarning,
            EventKind::ValidationIssue { .. } => EventTopic::ValidationIssue,
            EventKind::DecisionRecorded { .. } => EventTopic::DecisionRecorded,
            EventKind::ScenarioHalted { .. } => EventTopic::ScenarioHalted,
            EventKind::ScenarioFinished { .. } => EventTopic::ScenarioFinished,
            EventKind::ScenarioFailed { .. } => EventTopic::ScenarioFailed,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::TurnStarted { turn } => write!(f, "turn {turn} started"),
            EventKind::TurnCompleted { turn } => write!(f, "turn {turn} completed"),
            EventKind::PhaseCompleted { phase, turn } => {
                write!(f, "phase {phase} completed (turn {turn})")
            }
            EventKind::PhaseSkipped { phase, turn } => {
                write!(f, "phase {phase} skipped (turn {turn})")
            }
            EventKind::CostIncurred {
                actor,
                phase,
                model,
                cost,
            } => match actor {
                Some(actor) => write!(f, "cost {cost:.6} for {actor} ({model}, {phase})"),
                None => write!(f, "cost {cost:.6} system ({model}, {phase})"),
            },
            EventKind::CreditWarning { spent, limit } => {
                write!(f, "credit warning: {spent:.6} of {limit:.6} spent")
            }
            EventKind::ValidationIssue { turn, actor, message } => match actor {
                Some(actor) => write!(f, "validation issue (turn {turn}, {actor}): {message}"),
                None => write!(f, "validation issue (turn {turn}): {message}"),
            },
            EventKind::DecisionRecorded {
                actor,
                turn,
                degraded,
            } => {
                if *degraded {
                    write!(f, "degraded decision recorded for {actor} (turn {turn})")
                } else {
                    write!(f, "decision recorded for {actor} (turn {turn})")
                }
            }
            EventKind::ScenarioHalted { reason, turn } => {
                write!(f, "scenario halted ({reason}) at turn {turn}")
            }
            EventKind::ScenarioFinished { turn } => write!(f, "scenario finished at turn {turn}"),
            EventKind::ScenarioFailed { turn, error } => {
                write!(f, "scenario failed at turn {turn}: {error}")
            }
        }
    }
}

/// Fieldless event discriminant used as the subscription key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTopic {
    TurnStarted,
    TurnCompleted,
    PhaseCompleted,
    PhaseSkipped,
    CostIncurred,
    CreditWarning,
    ValidationIssue,
    DecisionRecorded,
    ScenarioHalted,
    ScenarioFinished,
    ScenarioFailed,
}

impl EventTopic {
    /// Stable string form used in exported event documents.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::TurnStarted => "turn_started",
            EventTopic::TurnCompleted => "turn_completed",
            EventTopic::PhaseCompleted => "phase_completed",
            EventTopic::PhaseSkipped => "phase_skipped",
            EventTopic::CostIncurred => "cost_incurred",
            EventTopic::CreditWarning => "credit_warning",
            EventTopic::ValidationIssue => "validation_issue",
            EventTopic::DecisionRecorded => "decision_recorded",
            EventTopic::ScenarioHalted => "scenario_halted",
            EventTopic::ScenarioFinished => "scenario_finished",
            EventTopic::ScenarioFailed => "scenario_failed",
        }
    }
}

impl fmt::Display for EventTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
