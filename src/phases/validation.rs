//! Structural checks over the turn's outputs.

use async_trait::async_trait;
use serde_json::json;

use crate::event_bus::EventKind;
use crate::phase::{Phase, PhaseContext, PhaseError};
use crate::state::{MetricRecord, ScenarioState};
use crate::types::PhaseKind;

/// Validates the turn's structural invariants: every actor decided, how
/// many decisions were degraded, and that the world narrative is non-empty.
///
/// Findings are surfaced as ValidationIssue events and flagged in execution
/// metadata for downstream review; they never abort the turn.
#[derive(Default)]
pub struct ValidationPhase;

impl ValidationPhase {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Phase for ValidationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Validation
    }

    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError> {
        let turn = cx.turn;
        let mut missing: u64 = 0;
        let mut degraded: u64 = 0;

        for name in &state.actor_order {
            match state.decisions.get(name) {
                None => {
                    missing += 1;
                    cx.emit(EventKind::ValidationIssue {
                        turn,
                        actor: Some(name.clone()),
                        message: "no decision recorded this turn".to_string(),
                    });
                }
                Some(decision) if decision.is_degraded() => {
                    degraded += 1;
                    cx.emit(EventKind::ValidationIssue {
                        turn,
                        actor: Some(name.clone()),
                        message: "decision degraded by actor failure".to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        if state.world.turn == turn && state.world.narrative.trim().is_empty() {
            cx.emit(EventKind::ValidationIssue {
                turn,
                actor: None,
                message: "world narrative is empty".to_string(),
            });
        }

        let mut state = state.with_metric(MetricRecord::new(
            "degraded_decisions",
            turn,
            degraded as f64,
            None,
        ));
        if missing + degraded > 0 {
            state = state.with_metadata(
                "validation",
                json!({
                    "turn": turn,
                    "missing_decisions": missing,
                    "degraded_decisions": degraded,
                }),
            );
        }
        Ok(state)
    }
}
