//! Wholesale world narrative replacement.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{ExogenousEvent, PromptBuilder};
use crate::event_bus::EventKind;
use crate::model::ModelInvoker;
use crate::phase::{Phase, PhaseContext, PhaseError};
use crate::state::{ScenarioState, WorldState};
use crate::types::PhaseKind;

/// Builds the next [`WorldState`] from the turn's decisions with a single
/// model call and injects any exogenous events scheduled for the turn.
///
/// The previous world snapshot is never patched — the new narrative
/// replaces it wholesale. The call is system-level cost (no actor).
pub struct WorldUpdatePhase {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptBuilder>,
    model: String,
    events: Vec<ExogenousEvent>,
}

impl WorldUpdatePhase {
    #[must_use]
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptBuilder>,
        model: &str,
        events: Vec<ExogenousEvent>,
    ) -> Self {
        Self {
            invoker,
            prompts,
            model: model.to_string(),
            events,
        }
    }
}

#[async_trait]
impl Phase for WorldUpdatePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::WorldUpdate
    }

    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError> {
        let turn = cx.turn;
        let pending: Vec<&ExogenousEvent> = self
            .events
            .iter()
            .filter(|e| e.turn == turn && !state.triggered_events.iter().any(|t| t == &e.id))
            .collect();
        let injected: Vec<String> = pending.iter().map(|e| e.description.clone()).collect();

        let prompt = self.prompts.world_prompt(&state, &injected);
        let outcome = self.invoker.invoke(&self.model, &prompt, false).await?;

        let mut state = state;
        if !outcome.cached {
            let record = cx.ledger.record(
                None,
                PhaseKind::WorldUpdate,
                turn,
                &self.model,
                outcome.input_tokens,
                outcome.output_tokens,
            )?;
            cx.emit(EventKind::CostIncurred {
                actor: None,
                phase: PhaseKind::WorldUpdate,
                model: self.model.clone(),
                cost: record.cost,
            });
            state = state.with_cost(record);
        }

        let mut world = WorldState::new(turn, outcome.text).with_metadata("model", json!(self.model));
        if !pending.is_empty() {
            let ids: Vec<&str> = pending.iter().map(|e| e.id.as_str()).collect();
            world = world.with_metadata("injected_events", json!(ids));
        }
        for event in pending {
            state = state.with_triggered_event(&event.id);
        }

        Ok(state.with_world_state(world))
    }
}
