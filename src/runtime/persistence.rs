/*!
Persistence primitives for serializing/deserializing run state and turn
archives (used by the file-backed snapshot store and any future durable
backends).

Design Goals:
- Provide explicit serde-friendly structs decoupled from internal
  in-memory representations.
- Keep conversion logic localized (From / TryFrom impls) so the store
  code is lean and declarative.
- Preserve non-primitive keys: the turn archive is keyed by turn number,
  which JSON stores as object keys; deserialization reconstructs numeric
  keys, never leaves them as text.

This module intentionally does NOT perform I/O. It is pure data
transformation and (de)serialization glue.
*/

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::comms::Communication;
use crate::state::{
    ActorState, CostRecord, Decision, MetricRecord, ScenarioState, WorldState,
};
use crate::types::{MetricValue, PhaseKind, ScenarioStatus};

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("missing field: {0}")]
    #[diagnostic(
        code(turnloom::persistence::missing_field),
        help("Populate the field in the persisted JSON before conversion.")
    )]
    MissingField(&'static str),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(turnloom::persistence::serde),
        help("Ensure the JSON structure matches the Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("persistence error: {0}")]
    #[diagnostic(code(turnloom::persistence::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

fn to_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_rfc3339(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/* ---------- persisted shapes ---------- */

/// Persisted shape of [`WorldState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedWorld {
    pub turn: u64,
    pub narrative: String,
    /// RFC3339 string form (keeps chrono out of the serialized shape).
    pub created_at: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
}

/// Persisted shape of [`Decision`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedDecision {
    pub actor: String,
    pub turn: u64,
    #[serde(default)]
    pub goals: Vec<String>,
    pub reasoning: String,
    pub action: String,
    pub timestamp: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
}

/// Persisted shape of [`ActorState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedActor {
    pub name: String,
    pub short_id: String,
    pub model: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub recent_decisions: Vec<PersistedDecision>,
    #[serde(default)]
    pub private_info: String,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
}

/// Persisted shape of [`CostRecord`]. Phase is stored in encoded string
/// form for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCostRecord {
    pub timestamp: String,
    pub actor: Option<String>,
    pub phase: String,
    pub turn: u64,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
}

/// Persisted shape of [`MetricRecord`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedMetricRecord {
    pub name: String,
    pub turn: u64,
    pub value: MetricValue,
    pub actor: Option<String>,
    pub timestamp: String,
}

/// Complete persisted shape of the in-memory [`ScenarioState`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedScenarioState {
    pub scenario_id: String,
    pub run_id: String,
    /// Status in [`ScenarioStatus::encode`] form.
    pub status: String,
    pub turn: u64,
    pub phase: Option<String>,
    pub world: PersistedWorld,
    pub actor_order: Vec<String>,
    #[serde(default)]
    pub actors: FxHashMap<String, PersistedActor>,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub decisions: FxHashMap<String, PersistedDecision>,
    #[serde(default)]
    pub metrics: Vec<PersistedMetricRecord>,
    #[serde(default)]
    pub costs: Vec<PersistedCostRecord>,
    #[serde(default)]
    pub metadata: FxHashMap<String, Value>,
    #[serde(default)]
    pub triggered_events: Vec<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Persisted per-turn artifact bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedTurnArtifacts {
    pub turn: u64,
    pub world: PersistedWorld,
    #[serde(default)]
    pub decisions: Vec<PersistedDecision>,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub triggered_events: Vec<String>,
}

/// Full persisted run document: the entire state plus the turn archive.
///
/// The archive is keyed by turn number. JSON object keys are strings on
/// disk; `BTreeMap<u64, _>` round-trips them back to numeric keys on load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedRun {
    pub state: PersistedScenarioState,
    #[serde(default)]
    pub turns: BTreeMap<u64, PersistedTurnArtifacts>,
}

/* ---------- WorldState conversions ---------- */

impl From<&WorldState> for PersistedWorld {
    fn from(w: &WorldState) -> Self {
        PersistedWorld {
            turn: w.turn,
            narrative: w.narrative.clone(),
            created_at: to_rfc3339(&w.created_at),
            metadata: w.metadata.clone(),
        }
    }
}

impl From<PersistedWorld> for WorldState {
    fn from(p: PersistedWorld) -> Self {
        WorldState {
            turn: p.turn,
            narrative: p.narrative,
            created_at: parse_rfc3339(&p.created_at),
            metadata: p.metadata,
        }
    }
}

/* ---------- Decision conversions ---------- */

impl From<&Decision> for PersistedDecision {
    fn from(d: &Decision) -> Self {
        PersistedDecision {
            actor: d.actor.clone(),
            turn: d.turn,
            goals: d.goals.clone(),
            reasoning: d.reasoning.clone(),
            action: d.action.clone(),
            timestamp: to_rfc3339(&d.timestamp),
            metadata: d.metadata.clone(),
        }
    }
}

impl From<PersistedDecision> for Decision {
    fn from(p: PersistedDecision) -> Self {
        Decision {
            actor: p.actor,
            turn: p.turn,
            goals: p.goals,
            reasoning: p.reasoning,
            action: p.action,
            timestamp: parse_rfc3339(&p.timestamp),
            metadata: p.metadata,
        }
    }
}

/* ---------- ActorState conversions ---------- */

impl From<&ActorState> for PersistedActor {
    fn from(a: &ActorState) -> Self {
        PersistedActor {
            name: a.name.clone(),
            short_id: a.short_id.clone(),
            model: a.model.clone(),
            goals: a.goals.clone(),
            recent_decisions: a.recent_decisions.iter().map(PersistedDecision::from).collect(),
            private_info: a.private_info.clone(),
            metadata: a.metadata.clone(),
        }
    }
}

impl From<PersistedActor> for ActorState {
    fn from(p: PersistedActor) -> Self {
        ActorState {
            name: p.name,
            short_id: p.short_id,
            model: p.model,
            goals: p.goals,
            recent_decisions: p.recent_decisions.into_iter().map(Decision::from).collect(),
            private_info: p.private_info,
            metadata: p.metadata,
        }
    }
}

/* ---------- record conversions ---------- */

impl From<&CostRecord> for PersistedCostRecord {
    fn from(r: &CostRecord) -> Self {
        PersistedCostRecord {
            timestamp: to_rfc3339(&r.timestamp),
            actor: r.actor.clone(),
            phase: r.phase.encode().to_string(),
            turn: r.turn,
            model: r.model.clone(),
            input_tokens: r.input_tokens,
            output_tokens: r.output_tokens,
            cost: r.cost,
        }
    }
}

impl TryFrom<PersistedCostRecord> for CostRecord {
    type Error = PersistenceError;

    fn try_from(p: PersistedCostRecord) -> Result<Self> {
        let phase = PhaseKind::decode(&p.phase)
            .ok_or(PersistenceError::MissingField("cost record phase"))?;
        Ok(CostRecord {
            timestamp: parse_rfc3339(&p.timestamp),
            actor: p.actor,
            phase,
            turn: p.turn,
            model: p.model,
            input_tokens: p.input_tokens,
            output_tokens: p.output_tokens,
            cost: p.cost,
        })
    }
}

impl From<&MetricRecord> for PersistedMetricRecord {
    fn from(r: &MetricRecord) -> Self {
        PersistedMetricRecord {
            name: r.name.clone(),
            turn: r.turn,
            value: r.value.clone(),
            actor: r.actor.clone(),
            timestamp: to_rfc3339(&r.timestamp),
        }
    }
}

impl From<PersistedMetricRecord> for MetricRecord {
    fn from(p: PersistedMetricRecord) -> Self {
        MetricRecord {
            name: p.name,
            turn: p.turn,
            value: p.value,
            actor: p.actor,
            timestamp: parse_rfc3339(&p.timestamp),
        }
    }
}

/* ---------- ScenarioState conversions ---------- */

impl From<&ScenarioState> for PersistedScenarioState {
    fn from(s: &ScenarioState) -> Self {
        PersistedScenarioState {
            scenario_id: s.scenario_id.clone(),
            run_id: s.run_id.clone(),
            status: s.status.encode(),
            turn: s.turn,
            phase: s.phase.map(|p| p.encode().to_string()),
            world: PersistedWorld::from(s.world.as_ref()),
            actor_order: s.actor_order.clone(),
            actors: s
                .actors
                .iter()
                .map(|(name, actor)| (name.clone(), PersistedActor::from(actor.as_ref())))
                .collect(),
            communications: s.communications.clone(),
            decisions: s
                .decisions
                .iter()
                .map(|(name, decision)| (name.clone(), PersistedDecision::from(decision)))
                .collect(),
            metrics: s.metrics.iter().map(PersistedMetricRecord::from).collect(),
            costs: s.costs.iter().map(PersistedCostRecord::from).collect(),
            metadata: s.metadata.clone(),
            triggered_events: s.triggered_events.clone(),
            started_at: s.started_at.as_ref().map(to_rfc3339),
            completed_at: s.completed_at.as_ref().map(to_rfc3339),
        }
    }
}

impl TryFrom<PersistedScenarioState> for ScenarioState {
    type Error = PersistenceError;

    fn try_from(p: PersistedScenarioState) -> Result<Self> {
        let costs = p
            .costs
            .into_iter()
            .map(CostRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(ScenarioState {
            scenario_id: p.scenario_id,
            run_id: p.run_id,
            status: ScenarioStatus::decode(&p.status),
            turn: p.turn,
            phase: p.phase.as_deref().and_then(PhaseKind::decode),
            world: Arc::new(WorldState::from(p.world)),
            actor_order: p.actor_order,
            actors: p
                .actors
                .into_iter()
                .map(|(name, actor)| (name, Arc::new(ActorState::from(actor))))
                .collect(),
            communications: p.communications,
            decisions: p
                .decisions
                .into_iter()
                .map(|(name, decision)| (name, Decision::from(decision)))
                .collect(),
            metrics: p.metrics.into_iter().map(MetricRecord::from).collect(),
            costs,
            metadata: p.metadata,
            triggered_events: p.triggered_events,
            started_at: p.started_at.as_deref().map(parse_rfc3339),
            completed_at: p.completed_at.as_deref().map(parse_rfc3339),
        })
    }
}
