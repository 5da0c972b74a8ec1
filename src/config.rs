//! Validated configuration contracts consumed from external collaborators.
//!
//! Turnloom does not load or validate configuration files itself; a
//! config-loading collaborator hands over already-validated, typed objects
//! in the shapes defined here. [`PromptBuilder`] is the companion contract
//! for the prompt-construction collaborator.

use serde::{Deserialize, Serialize};

use crate::state::{ActorState, ScenarioState};
use crate::types::CommKind;

/// A reusable simulation definition: actors, initial world, schedule.
///
/// Actor declaration order is significant — decision merges and exports
/// follow it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Stable scenario identifier.
    pub scenario_id: String,
    /// Actors in declaration order.
    pub actors: Vec<ActorSpec>,
    /// Narrative the world starts from at turn 0.
    pub initial_world: String,
    /// Planned communication exchanges executed each turn.
    #[serde(default)]
    pub communication_plan: Vec<PlannedExchange>,
    /// Events injected into the world at scheduled turns.
    #[serde(default)]
    pub exogenous_events: Vec<ExogenousEvent>,
}

impl ScenarioSpec {
    /// Events scheduled for the given turn that have not yet triggered in
    /// `state`.
    pub fn pending_events_for_turn<'a>(
        &'a self,
        turn: u64,
        state: &'a ScenarioState,
    ) -> impl Iterator<Item = &'a ExogenousEvent> {
        self.exogenous_events
            .iter()
            .filter(move |e| e.turn == turn && !state.triggered_events.iter().any(|t| t == &e.id))
    }
}

/// One actor definition within a [`ScenarioSpec`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActorSpec {
    /// Unique actor name.
    pub name: String,
    /// Short identifier used in rendered artifacts.
    pub short_id: String,
    /// Model identifier the actor decides with.
    pub model: String,
    /// Initial goals.
    #[serde(default)]
    pub goals: Vec<String>,
    /// Information only this actor sees.
    #[serde(default)]
    pub private_info: String,
}

/// One planned exchange in the communication phase.
///
/// Exchanges run concurrently where independent but always merge into state
/// in plan order, so the turn's communication log is deterministic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedExchange {
    /// Sending actor.
    pub sender: String,
    /// Recipients; empty means public.
    #[serde(default)]
    pub recipients: Vec<String>,
    /// Exchange scope.
    pub kind: CommKind,
}

/// A scripted event injected into the world narrative at a fixed turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExogenousEvent {
    /// Stable event id, recorded in state once triggered.
    pub id: String,
    /// Turn at which the event fires.
    pub turn: u64,
    /// Narrative description handed to the world-update prompt.
    pub description: String,
}

/// Prompt-construction collaborator contract.
///
/// Implementations render the fully-assembled prompt text that the model
/// invocation layer sends out; the rendered prompt is also what the response
/// cache fingerprints, so implementations should be deterministic for a
/// given state.
pub trait PromptBuilder: Send + Sync {
    /// Prompt asking `actor` for its decision this turn.
    fn decision_prompt(&self, state: &ScenarioState, actor: &ActorState) -> String;

    /// Prompt asking `sender` to address `recipients` (empty = everyone).
    fn communication_prompt(
        &self,
        state: &ScenarioState,
        sender: &ActorState,
        recipients: &[String],
    ) -> String;

    /// Prompt asking the world model for the next narrative, given this
    /// turn's decisions and any injected event descriptions.
    fn world_prompt(&self, state: &ScenarioState, injected_events: &[String]) -> String;
}
