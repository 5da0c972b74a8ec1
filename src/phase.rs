//! Phase execution framework for the Turnloom turn pipeline.
//!
//! This module provides the core abstractions for executable turn phases:
//! the [`Phase`] trait, the execution context, and phase error handling.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::event_bus::{EventBus, EventKind, RunEvent};
use crate::ledger::{CostLedger, PricingError};
use crate::model::ModelCallError;
use crate::runtime::store::StoreError;
use crate::state::ScenarioState;
use crate::types::PhaseKind;

/// Core capability trait for turn phases.
///
/// A phase receives the current immutable state and returns the next state.
/// Phases are selected through explicit registration on a
/// [`PipelineBuilder`](crate::pipeline::PipelineBuilder), never through
/// inheritance; the orchestrator invokes them strictly in
/// [`PhaseKind::ORDER`].
///
/// # Design Principles
///
/// - **Pure over state**: a phase never mutates its input; it derives a new
///   `ScenarioState` through the `with_*` transforms.
/// - **Isolated failures**: per-actor problems are recorded as degraded
///   decisions or validation issues, not surfaced as phase errors. A
///   returned `Err` means the whole phase failed and is subject to the
///   orchestrator's retry budget.
/// - **Observable**: use [`PhaseContext::emit`] so collaborators can follow
///   progress on the event bus.
///
/// # Examples
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use turnloom::phase::{Phase, PhaseContext, PhaseError};
/// use turnloom::state::{MetricRecord, ScenarioState};
/// use turnloom::types::PhaseKind;
///
/// struct TurnCounterPhase;
///
/// #[async_trait]
/// impl Phase for TurnCounterPhase {
///     fn kind(&self) -> PhaseKind {
///         PhaseKind::Validation
///     }
///
///     async fn execute(
///         &self,
///         state: ScenarioState,
///         _cx: &PhaseContext,
///     ) -> Result<ScenarioState, PhaseError> {
///         let record = MetricRecord::new("turns_seen", state.turn, state.turn as f64, None);
///         Ok(state.with_metric(record))
///     }
/// }
/// ```
#[async_trait]
pub trait Phase: Send + Sync {
    /// Which pipeline slot this phase fills.
    fn kind(&self) -> PhaseKind;

    /// Execute this phase, transforming `state` into the next state.
    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError>;
}

/// Execution context passed to phases.
///
/// Carries the run correlation id, the current turn, and handles to the two
/// shared mutable resources a phase may touch: the event bus and the cost
/// ledger.
#[derive(Clone)]
pub struct PhaseContext {
    /// Run id; stamped onto every emitted event.
    pub run_id: String,
    /// Turn currently executing.
    pub turn: u64,
    /// Event bus for observability.
    pub bus: Arc<EventBus>,
    /// Cost ledger shared across the run's phases.
    pub ledger: Arc<CostLedger>,
}

impl PhaseContext {
    /// Emit an event correlated with this context's run.
    pub fn emit(&self, kind: EventKind) {
        self.bus.emit(RunEvent::new(self.run_id.clone(), kind));
    }
}

/// Errors that fail a whole phase.
///
/// These are subject to the orchestrator's retry budget; once exhausted the
/// run transitions to `Failed` with diagnostic state persisted. Anything
/// recoverable (one actor's bad output, a validation finding) belongs in
/// state metadata or on the event bus instead.
#[derive(Debug, Error, Diagnostic)]
pub enum PhaseError {
    /// The model invocation layer gave up after its own retries.
    #[error("model call failed: {0}")]
    #[diagnostic(code(turnloom::phase::model))]
    Model(#[from] ModelCallError),

    /// Pricing lookup failed; the ledger fails closed.
    #[error(transparent)]
    #[diagnostic(code(turnloom::phase::pricing))]
    Pricing(#[from] PricingError),

    /// The snapshot store rejected a persistence attempt.
    #[error(transparent)]
    #[diagnostic(code(turnloom::phase::store))]
    Store(#[from] StoreError),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(turnloom::phase::serde_json))]
    Serde(#[from] serde_json::Error),

    /// The phase's preconditions over the state did not hold.
    #[error("invalid state for {phase}: {message}")]
    #[diagnostic(
        code(turnloom::phase::invalid_state),
        help("Check that earlier phases ran and produced the expected state.")
    )]
    InvalidState {
        phase: PhaseKind,
        message: String,
    },
}
