//! Immutable state management for the Turnloom simulation engine.
//!
//! The root type is [`ScenarioState`]: a versioned-by-turn, immutable
//! snapshot of everything that defines a run at a point in time. Every
//! transformation returns a brand-new instance; no prior instance is ever
//! altered. Substructures that a transformation does not touch (the world
//! narrative, untouched actor states) are shared by `Arc` between the old
//! and new instances, which keeps per-phase transforms cheap without ever
//! mutating shared data in place.
//!
//! # Core Types
//!
//! - [`ScenarioState`]: The root immutable run state
//! - [`WorldState`]: The shared narrative, replaced wholesale each turn
//! - [`ActorState`]: One actor's identity, goals, and rolling history
//! - [`Decision`]: One actor's recorded output for a turn
//! - [`CostRecord`] / [`MetricRecord`]: Append-only full-history ledgers
//!
//! # Examples
//!
//! ```rust
//! use turnloom::state::{ScenarioState, ActorState, WorldState};
//! use turnloom::types::ScenarioStatus;
//!
//! let s0 = ScenarioState::builder()
//!     .with_scenario_id("border-dispute")
//!     .with_actor(ActorState::new("atlas", "AT", "mock-small"))
//!     .with_actor(ActorState::new("borealis", "BO", "mock-small"))
//!     .with_world("Two republics share a contested mountain pass.")
//!     .build();
//!
//! let s1 = s0.with_status(ScenarioStatus::Running);
//!
//! // The original is untouched.
//! assert_eq!(s0.status, ScenarioStatus::Created);
//! assert_eq!(s1.status, ScenarioStatus::Running);
//! assert_eq!(s1.actor_order, vec!["atlas".to_string(), "borealis".to_string()]);
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::comms::Communication;
use crate::config::ScenarioSpec;
use crate::types::{MetricValue, PhaseKind, ScenarioStatus};

/// How many past decisions each actor retains; the oldest is evicted first.
pub const DECISION_HISTORY_LIMIT: usize = 5;

/// The shared narrative state all actors observe.
///
/// A `WorldState` is immutable and replaced wholesale each turn; it is never
/// patched in place.
#[derive(Clone, Debug, PartialEq)]
pub struct WorldState {
    /// Turn this world snapshot belongs to (0 = initial setup).
    pub turn: u64,
    /// Narrative content describing the world.
    pub narrative: String,
    /// When this snapshot was produced.
    pub created_at: DateTime<Utc>,
    /// Producer metadata (model id, injected event ids, ...).
    pub metadata: FxHashMap<String, Value>,
}

impl WorldState {
    /// Creates a world snapshot for the given turn.
    #[must_use]
    pub fn new(turn: u64, narrative: impl Into<String>) -> Self {
        Self {
            turn,
            narrative: narrative.into(),
            created_at: Utc::now(),
            metadata: FxHashMap::default(),
        }
    }

    /// Attaches a metadata entry, consuming and returning the snapshot.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// One independent decision-making participant.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorState {
    /// Unique actor name; also the key in [`ScenarioState::actors`].
    pub name: String,
    /// Short identifier used in rendered artifacts.
    pub short_id: String,
    /// Model identifier this actor decides with.
    pub model: String,
    /// Current goals, refreshed as the scenario evolves.
    pub goals: Vec<String>,
    /// Rolling history of the last [`DECISION_HISTORY_LIMIT`] decisions,
    /// oldest first.
    pub recent_decisions: Vec<Decision>,
    /// Information only this actor sees.
    pub private_info: String,
    /// Free-form actor metadata.
    pub metadata: FxHashMap<String, Value>,
}

impl ActorState {
    /// Creates an actor with empty goals and history.
    #[must_use]
    pub fn new(name: &str, short_id: &str, model: &str) -> Self {
        Self {
            name: name.to_string(),
            short_id: short_id.to_string(),
            model: model.to_string(),
            goals: Vec::new(),
            recent_decisions: Vec::new(),
            private_info: String::new(),
            metadata: FxHashMap::default(),
        }
    }

    /// Replaces the actor's goals.
    #[must_use]
    pub fn with_goals(mut self, goals: Vec<String>) -> Self {
        self.goals = goals;
        self
    }

    /// Sets the actor's private information.
    #[must_use]
    pub fn with_private_info(mut self, info: impl Into<String>) -> Self {
        self.private_info = info.into();
        self
    }

    /// Returns a copy of this actor with `decision` appended to the rolling
    /// history, evicting the oldest entry once the limit is reached.
    #[must_use]
    pub fn with_decision(&self, decision: Decision) -> Self {
        let mut next = self.clone();
        next.recent_decisions.push(decision);
        if next.recent_decisions.len() > DECISION_HISTORY_LIMIT {
            let overflow = next.recent_decisions.len() - DECISION_HISTORY_LIMIT;
            next.recent_decisions.drain(..overflow);
        }
        next
    }
}

/// One actor's recorded goals, reasoning, and action for a turn.
#[derive(Clone, Debug, PartialEq)]
pub struct Decision {
    /// Deciding actor.
    pub actor: String,
    /// Turn the decision belongs to.
    pub turn: u64,
    /// Goals the actor held at decision time.
    pub goals: Vec<String>,
    /// Free-text reasoning.
    pub reasoning: String,
    /// Free-text action.
    pub action: String,
    /// When the decision was produced.
    pub timestamp: DateTime<Utc>,
    /// Flags such as `degraded`, `error`, `parse_fallback`, `model`.
    pub metadata: FxHashMap<String, Value>,
}

impl Decision {
    /// Creates a decision record.
    #[must_use]
    pub fn new(actor: &str, turn: u64, goals: Vec<String>, reasoning: &str, action: &str) -> Self {
        Self {
            actor: actor.to_string(),
            turn,
            goals,
            reasoning: reasoning.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            metadata: FxHashMap::default(),
        }
    }

    /// Creates the degraded placeholder recorded when an actor's decision
    /// computation fails. The failure is isolated here instead of failing
    /// the phase.
    #[must_use]
    pub fn degraded(actor: &str, turn: u64, goals: Vec<String>, error: &str) -> Self {
        let mut decision = Self::new(actor, turn, goals, "", "No action taken.");
        decision
            .metadata
            .insert("degraded".to_string(), Value::Bool(true));
        decision
            .metadata
            .insert("error".to_string(), Value::String(error.to_string()));
        decision
    }

    /// Attaches a metadata entry, consuming and returning the decision.
    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Whether this decision is a degraded placeholder for a failed actor.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        matches!(self.metadata.get("degraded"), Some(Value::Bool(true)))
    }
}

/// One metered, externally-billed call.
///
/// `actor` is `None` for system-level cost (e.g. the world update call).
/// Totals are always derived by summation over these records — there is no
/// separately maintained counter anywhere in the crate.
#[derive(Clone, Debug, PartialEq)]
pub struct CostRecord {
    /// When the cost was incurred.
    pub timestamp: DateTime<Utc>,
    /// Billed actor, or `None` for system-level cost.
    pub actor: Option<String>,
    /// Phase the call belonged to.
    pub phase: PhaseKind,
    /// Turn the call belonged to.
    pub turn: u64,
    /// Model identifier the pricing was looked up for.
    pub model: String,
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
    /// Monetary cost in account currency units.
    pub cost: f64,
}

/// One extracted measurement.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricRecord {
    /// Metric name.
    pub name: String,
    /// Turn the measurement belongs to.
    pub turn: u64,
    /// Measured value.
    pub value: MetricValue,
    /// Actor scope, or `None` for scenario-level metrics.
    pub actor: Option<String>,
    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Creates a metric record.
    #[must_use]
    pub fn new(name: &str, turn: u64, value: impl Into<MetricValue>, actor: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            turn,
            value: value.into(),
            actor: actor.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// The immutable root state of a run.
///
/// Every mutation produces a new `ScenarioState`; `turn` is monotonic
/// non-decreasing across the run. `communications` and `decisions` hold only
/// the in-progress turn's entries — history lives in the per-actor rolling
/// decision lists and in the persisted per-turn artifacts.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioState {
    /// Reusable scenario definition this run executes.
    pub scenario_id: String,
    /// Unique identifier of this execution instance.
    pub run_id: String,
    /// Lifecycle status.
    pub status: ScenarioStatus,
    /// Current turn number (0 before the first turn starts).
    pub turn: u64,
    /// Phase most recently entered, if any.
    pub phase: Option<PhaseKind>,
    /// Shared world narrative; replaced wholesale, shared by reference.
    pub world: Arc<WorldState>,
    /// Actor names in declaration order. Decision merges follow this order.
    pub actor_order: Vec<String>,
    /// Actor states keyed by name; values shared by reference.
    pub actors: FxHashMap<String, Arc<ActorState>>,
    /// Turn-scoped communication traffic.
    pub communications: Vec<Communication>,
    /// Turn-scoped decisions keyed by actor name.
    pub decisions: FxHashMap<String, Decision>,
    /// Full-history metric records.
    pub metrics: Vec<MetricRecord>,
    /// Full-history cost records.
    pub costs: Vec<CostRecord>,
    /// Execution metadata (branch provenance, failure diagnostics, ...).
    pub metadata: FxHashMap<String, Value>,
    /// Ids of exogenous events already triggered.
    pub triggered_events: Vec<String>,
    /// When the run first started executing.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScenarioState {
    /// Creates a builder for fluent state construction.
    pub fn builder() -> ScenarioStateBuilder {
        ScenarioStateBuilder::default()
    }

    /// Constructs the initial `Created` state from a validated scenario
    /// specification, assigning the given run id.
    #[must_use]
    pub fn from_spec(spec: &ScenarioSpec, run_id: &str) -> Self {
        let mut builder = Self::builder()
            .with_scenario_id(&spec.scenario_id)
            .with_run_id(run_id)
            .with_world(&spec.initial_world);
        for actor in &spec.actors {
            builder = builder.with_actor(
                ActorState::new(&actor.name, &actor.short_id, &actor.model)
                    .with_goals(actor.goals.clone())
                    .with_private_info(actor.private_info.clone()),
            );
        }
        builder.build()
    }

    /// Looks up an actor by name.
    #[must_use]
    pub fn actor(&self, name: &str) -> Option<&ActorState> {
        self.actors.get(name).map(Arc::as_ref)
    }

    /// Iterates actors in declaration order.
    pub fn actors_in_order(&self) -> impl Iterator<Item = &ActorState> {
        self.actor_order
            .iter()
            .filter_map(|name| self.actors.get(name).map(Arc::as_ref))
    }

    /// Total monetary cost, recomputed by summation over the record list.
    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.costs.iter().map(|r| r.cost).sum()
    }

    /// Monetary cost attributed to one actor, recomputed by summation.
    #[must_use]
    pub fn cost_for_actor(&self, actor: &str) -> f64 {
        self.costs
            .iter()
            .filter(|r| r.actor.as_deref() == Some(actor))
            .map(|r| r.cost)
            .sum()
    }

    /// Monetary cost attributed to one phase, recomputed by summation.
    #[must_use]
    pub fn cost_for_phase(&self, phase: PhaseKind) -> f64 {
        self.costs
            .iter()
            .filter(|r| r.phase == phase)
            .map(|r| r.cost)
            .sum()
    }

    /* ---------- pure transformations ---------- */

    /// Returns a new state at `turn`. The turn counter is monotonic
    /// non-decreasing: an earlier turn number is ignored.
    #[must_use]
    pub fn with_turn(&self, turn: u64) -> Self {
        let mut next = self.clone();
        next.turn = next.turn.max(turn);
        next
    }

    /// Returns a new state with the given status.
    #[must_use]
    pub fn with_status(&self, status: ScenarioStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        next
    }

    /// Returns a new state with the given current phase marker.
    #[must_use]
    pub fn with_phase(&self, phase: Option<PhaseKind>) -> Self {
        let mut next = self.clone();
        next.phase = phase;
        next
    }

    /// Returns a new state whose world narrative is replaced wholesale.
    #[must_use]
    pub fn with_world_state(&self, world: WorldState) -> Self {
        let mut next = self.clone();
        next.world = Arc::new(world);
        next
    }

    /// Returns a new state with `decision` recorded for its actor in the
    /// current turn's decision map.
    #[must_use]
    pub fn with_decision(&self, decision: Decision) -> Self {
        let mut next = self.clone();
        next.decisions.insert(decision.actor.clone(), decision);
        next
    }

    /// Returns a new state with a cost record appended.
    #[must_use]
    pub fn with_cost(&self, record: CostRecord) -> Self {
        let mut next = self.clone();
        next.costs.push(record);
        next
    }

    /// Returns a new state with a metric record appended.
    #[must_use]
    pub fn with_metric(&self, record: MetricRecord) -> Self {
        let mut next = self.clone();
        next.metrics.push(record);
        next
    }

    /// Returns a new state with a communication appended to the current
    /// turn's traffic.
    #[must_use]
    pub fn with_communication(&self, comm: Communication) -> Self {
        let mut next = self.clone();
        next.communications.push(comm);
        next
    }

    /// Returns a new state with `actor` inserted or replaced. A previously
    /// unknown actor is appended to the declaration order.
    #[must_use]
    pub fn with_actor(&self, actor: ActorState) -> Self {
        let mut next = self.clone();
        if !next.actor_order.iter().any(|n| n == &actor.name) {
            next.actor_order.push(actor.name.clone());
        }
        next.actors.insert(actor.name.clone(), Arc::new(actor));
        next
    }

    /// Returns a new state with an execution-metadata entry set.
    #[must_use]
    pub fn with_metadata(&self, key: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.metadata.insert(key.to_string(), value);
        next
    }

    /// Returns a new state with an exogenous event id recorded as triggered.
    #[must_use]
    pub fn with_triggered_event(&self, event_id: &str) -> Self {
        let mut next = self.clone();
        next.triggered_events.push(event_id.to_string());
        next
    }

    /// Returns a new state marked as started now (first call wins).
    #[must_use]
    pub fn with_started(&self) -> Self {
        let mut next = self.clone();
        next.started_at.get_or_insert_with(Utc::now);
        next
    }

    /// Returns a new state marked as completed now.
    #[must_use]
    pub fn with_completed(&self) -> Self {
        let mut next = self.clone();
        next.completed_at = Some(Utc::now());
        next
    }

    /// Returns a new state positioned at the start of `turn`: the turn
    /// counter advances (monotonically) and the turn-scoped communication
    /// and decision collections are cleared.
    #[must_use]
    pub fn begin_turn(&self, turn: u64) -> Self {
        let mut next = self.with_turn(turn);
        next.communications.clear();
        next.decisions.clear();
        next.phase = None;
        next
    }
}

/// Builder for constructing [`ScenarioState`] with a fluent API.
///
/// Useful for tests and for collaborators that assemble initial states from
/// already-validated configuration.
///
/// # Examples
///
/// ```rust
/// use turnloom::state::{ScenarioState, ActorState};
///
/// let state = ScenarioState::builder()
///     .with_scenario_id("trade-summit")
///     .with_actor(ActorState::new("atlas", "AT", "mock-small"))
///     .with_world("Opening positions are unknown.")
///     .build();
///
/// assert_eq!(state.turn, 0);
/// assert_eq!(state.actor_order.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct ScenarioStateBuilder {
    scenario_id: String,
    run_id: Option<String>,
    actors: Vec<ActorState>,
    initial_world: String,
    metadata: FxHashMap<String, Value>,
}

impl ScenarioStateBuilder {
    /// Sets the scenario id.
    pub fn with_scenario_id(mut self, scenario_id: &str) -> Self {
        self.scenario_id = scenario_id.to_string();
        self
    }

    /// Sets the run id; a fresh one is generated when omitted.
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    /// Appends an actor; declaration order is the order of these calls.
    pub fn with_actor(mut self, actor: ActorState) -> Self {
        self.actors.push(actor);
        self
    }

    /// Sets the initial world narrative.
    pub fn with_world(mut self, narrative: &str) -> Self {
        self.initial_world = narrative.to_string();
        self
    }

    /// Sets an execution-metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    /// Builds the initial `Created` state at turn 0.
    pub fn build(self) -> ScenarioState {
        let run_id = self
            .run_id
            .unwrap_or_else(crate::utils::id_generator::generate_run_id);
        let mut actor_order = Vec::with_capacity(self.actors.len());
        let mut actors = FxHashMap::default();
        for actor in self.actors {
            actor_order.push(actor.name.clone());
            actors.insert(actor.name.clone(), Arc::new(actor));
        }
        ScenarioState {
            scenario_id: self.scenario_id,
            run_id,
            status: ScenarioStatus::Created,
            turn: 0,
            phase: None,
            world: Arc::new(WorldState::new(0, self.initial_world)),
            actor_order,
            actors,
            communications: Vec::new(),
            decisions: FxHashMap::default(),
            metrics: Vec::new(),
            costs: Vec::new(),
            metadata: self.metadata,
            triggered_events: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }
}
