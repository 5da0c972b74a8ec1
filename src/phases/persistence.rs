//! Turn-boundary durable persistence.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashSet;

use crate::phase::{Phase, PhaseContext, PhaseError};
use crate::runtime::store::{RunDocument, SnapshotStore, TurnArtifacts};
use crate::state::ScenarioState;
use crate::types::PhaseKind;

/// Assembles the turn's artifacts and atomically replaces the run's durable
/// document.
///
/// Artifacts are keyed by turn, so a turn re-executed after a resume
/// overwrites its previous artifacts instead of duplicating them.
pub struct PersistencePhase {
    store: Arc<dyn SnapshotStore>,
}

impl PersistencePhase {
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Phase for PersistencePhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Persistence
    }

    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError> {
        let turn = cx.turn;
        let mut doc = self
            .store
            .load(&state.run_id)
            .await?
            .unwrap_or_else(|| RunDocument::new(state.clone()));

        // Events already attributed to earlier turns stay there; only ids
        // first seen this turn land in this turn's artifacts.
        let attributed: FxHashSet<&str> = doc
            .turns
            .range(..turn)
            .flat_map(|(_, artifacts)| artifacts.triggered_events.iter().map(String::as_str))
            .collect();
        let new_events: Vec<String> = state
            .triggered_events
            .iter()
            .filter(|id| !attributed.contains(id.as_str()))
            .cloned()
            .collect();

        let decisions = state
            .actor_order
            .iter()
            .filter_map(|name| state.decisions.get(name).cloned())
            .collect();

        doc.record_turn(TurnArtifacts {
            turn,
            world: state.world.as_ref().clone(),
            decisions,
            communications: state.communications.clone(),
            triggered_events: new_events,
        });
        doc.state = state.clone();
        self.store.save(&doc).await?;
        Ok(state)
    }
}
