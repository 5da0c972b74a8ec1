//! Turn orchestration: the runtime engine that drives a run through its
//! phase pipeline, applies halting predicates, and persists state at turn
//! boundaries.
//!
//! # Architecture: Pipeline vs ScenarioRunner
//!
//! - **[`Pipeline`]**: the phase registry (what runs each turn)
//! - **`ScenarioRunner`**: the runtime environment (event bus, ledger,
//!   snapshot store, control signals)
//!
//! One `Pipeline` can be shared across many runners; each runner owns its
//! event bus so concurrent runs stream to isolated consumers while the
//! correlation id on every event keeps shared-bus setups unambiguous.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use crate::event_bus::{EventBus, EventKind};
use crate::ledger::CostLedger;
use crate::ledger::PricingTable;
use crate::phase::{PhaseContext, PhaseError};
use crate::pipeline::Pipeline;
use crate::runtime::config::RunnerConfig;
use crate::runtime::store::{SnapshotStore, StoreError, upsert_state};
use crate::state::ScenarioState;
use crate::types::{HaltReason, PhaseKind, ScenarioStatus};

/// Cooperative control handle for pause and cancellation.
///
/// Requests are honored only at phase boundaries — an in-flight phase
/// always runs to completion first, so state is never persisted mid-phase.
#[derive(Clone, Default)]
pub struct RunControl {
    pause: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl RunControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to pause at the next phase boundary.
    pub fn request_pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    /// Clear a pending pause request (used when resuming).
    pub fn clear_pause(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    /// Ask the run to halt (manual) at the next phase boundary.
    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Orchestrator errors.
#[derive(Debug, Error, Diagnostic)]
pub enum RunnerError {
    #[error("run not found: {run_id}")]
    #[diagnostic(code(turnloom::runner::run_not_found))]
    RunNotFound { run_id: String },

    #[error("run {run_id} is not resumable from status {status}")]
    #[diagnostic(
        code(turnloom::runner::not_resumable),
        help("Completed and Failed runs are terminal; branch from a completed turn instead.")
    )]
    NotResumable { run_id: String, status: String },

    #[error("phase {phase} failed at turn {turn} after {attempts} attempt(s): {source}")]
    #[diagnostic(code(turnloom::runner::phase_failed))]
    PhaseFailed {
        phase: PhaseKind,
        turn: u64,
        attempts: u32,
        #[source]
        source: PhaseError,
    },

    #[error(transparent)]
    #[diagnostic(code(turnloom::runner::store))]
    Store(#[from] StoreError),
}

enum BoundaryAction {
    Continue,
    Pause,
    Cancel,
}

/// Runtime execution engine for scenario runs.
///
/// # Usage
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use turnloom::ledger::PricingTable;
/// # use turnloom::pipeline::PipelineBuilder;
/// # use turnloom::runtime::{RunnerConfig, ScenarioRunner};
/// # use turnloom::runtime::store::InMemorySnapshotStore;
/// # use turnloom::state::ScenarioState;
/// # async fn example(initial: ScenarioState) -> Result<(), Box<dyn std::error::Error>> {
/// let runner = ScenarioRunner::new(
///     PipelineBuilder::new().build(),
///     Arc::new(InMemorySnapshotStore::new()),
///     PricingTable::new(),
///     RunnerConfig::default().with_end_turn(3),
/// );
///
/// let final_state = runner.run(initial).await?;
/// assert_eq!(final_state.turn, 3);
/// # Ok(())
/// # }
/// ```
pub struct ScenarioRunner {
    pipeline: Pipeline,
    store: Arc<dyn SnapshotStore>,
    pricing: PricingTable,
    config: RunnerConfig,
    bus: Arc<EventBus>,
    control: RunControl,
}

impl ScenarioRunner {
    /// Creates a runner with a fresh event bus sized from the config.
    #[must_use]
    pub fn new(
        pipeline: Pipeline,
        store: Arc<dyn SnapshotStore>,
        pricing: PricingTable,
        config: RunnerConfig,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.event_history_capacity));
        Self {
            pipeline,
            store,
            pricing,
            config,
            bus,
            control: RunControl::new(),
        }
    }

    /// Replaces the event bus (e.g. to share one bus across runs).
    #[must_use]
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = bus;
        self
    }

    /// The event bus this runner emits to.
    #[must_use]
    pub fn bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.bus)
    }

    /// A cloneable pause/cancel handle for this runner.
    #[must_use]
    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    /// Execute a run from its current state until a terminal status, a
    /// pause, or the configured end turn.
    ///
    /// Accepts `Created`, `Running`, `Paused`, and `Halted` states;
    /// `Completed` and `Failed` are rejected.
    #[instrument(skip(self, state), fields(run_id = %state.run_id), err)]
    pub async fn run(&self, state: ScenarioState) -> Result<ScenarioState, RunnerError> {
        if !state.status.is_resumable() {
            return Err(RunnerError::NotResumable {
                run_id: state.run_id.clone(),
                status: state.status.encode(),
            });
        }
        self.drive(state).await
    }

    /// Load the latest durable snapshot for `run_id` and continue execution
    /// from the turn following the snapshot's turn.
    ///
    /// Rejects `Completed` and `Failed` sources. Resuming an unmodified
    /// halted snapshot twice is idempotent: the archive is keyed by turn and
    /// the cost/metric history restarts from the snapshot's lists.
    #[instrument(skip(self), err)]
    pub async fn resume(&self, run_id: &str) -> Result<ScenarioState, RunnerError> {
        let doc = self
            .store
            .load(run_id)
            .await?
            .ok_or_else(|| RunnerError::RunNotFound {
                run_id: run_id.to_string(),
            })?;
        if !doc.state.status.is_resumable() {
            return Err(RunnerError::NotResumable {
                run_id: run_id.to_string(),
                status: doc.state.status.encode(),
            });
        }
        self.control.clear_pause();
        tracing::info!(run_id, turn = doc.state.turn, "resuming from snapshot");
        self.drive(doc.state).await
    }

    fn emit(&self, run_id: &str, kind: EventKind) {
        self.bus
            .emit(crate::event_bus::RunEvent::new(run_id.to_string(), kind));
    }

    fn boundary_action(&self) -> BoundaryAction {
        if self.control.is_cancel_requested() {
            BoundaryAction::Cancel
        } else if self.control.is_pause_requested() {
            BoundaryAction::Pause
        } else {
            BoundaryAction::Continue
        }
    }

    async fn pause_run(&self, state: ScenarioState) -> Result<ScenarioState, RunnerError> {
        let state = state.with_status(ScenarioStatus::Paused);
        upsert_state(self.store.as_ref(), &state).await?;
        tracing::info!(run_id = %state.run_id, turn = state.turn, "run paused");
        Ok(state)
    }

    async fn halt_run(
        &self,
        state: ScenarioState,
        reason: HaltReason,
    ) -> Result<ScenarioState, RunnerError> {
        let state = state
            .with_status(ScenarioStatus::Halted(reason))
            .with_completed();
        upsert_state(self.store.as_ref(), &state).await?;
        self.emit(
            &state.run_id,
            EventKind::ScenarioHalted {
                reason,
                turn: state.turn,
            },
        );
        tracing::info!(run_id = %state.run_id, turn = state.turn, %reason, "run halted");
        Ok(state)
    }

    /// The main turn loop.
    async fn drive(&self, state: ScenarioState) -> Result<ScenarioState, RunnerError> {
        let run_id = state.run_id.clone();

        let mut state = if state.status == ScenarioStatus::Created {
            state.with_started().with_status(ScenarioStatus::Running)
        } else {
            // Resumed runs drop the terminal timestamp a halt left behind.
            let mut resumed = state.with_status(ScenarioStatus::Running);
            resumed.completed_at = None;
            resumed
        };

        let mut credit_warned = false;

        while state.turn < self.config.end_turn {
            match self.boundary_action() {
                BoundaryAction::Pause => return self.pause_run(state).await,
                BoundaryAction::Cancel => return self.halt_run(state, HaltReason::Manual).await,
                BoundaryAction::Continue => {}
            }

            let turn = state.turn + 1;
            state = state.begin_turn(turn);
            self.emit(&run_id, EventKind::TurnStarted { turn });
            tracing::debug!(run_id = %run_id, turn, "turn started");

            let mut cancelled_mid_turn = false;
            for kind in PhaseKind::ORDER {
                // Pause/cancel are only honored here, between phases.
                match self.boundary_action() {
                    BoundaryAction::Pause => return self.pause_run(state).await,
                    BoundaryAction::Cancel => {
                        cancelled_mid_turn = true;
                        break;
                    }
                    BoundaryAction::Continue => {}
                }

                let Some(phase) = self.pipeline.phase(kind) else {
                    self.emit(&run_id, EventKind::PhaseSkipped { phase: kind, turn });
                    continue;
                };
                if self.config.dry_run {
                    self.emit(&run_id, EventKind::PhaseSkipped { phase: kind, turn });
                    continue;
                }

                state = self.execute_phase(phase.as_ref(), kind, state, turn).await?;
                self.emit(&run_id, EventKind::PhaseCompleted { phase: kind, turn });

                // Spend is always derived from the state's record list, the
                // same list that gets persisted.
                if let Some(limit) = self.config.credit_limit {
                    let spent = state.total_cost();
                    if !credit_warned && spent >= limit * self.config.credit_warn_fraction {
                        credit_warned = true;
                        self.emit(&run_id, EventKind::CreditWarning { spent, limit });
                    }
                }
            }

            if cancelled_mid_turn {
                return self.halt_run(state, HaltReason::Manual).await;
            }

            self.emit(&run_id, EventKind::TurnCompleted { turn });
            tracing::debug!(run_id = %run_id, turn, total_cost = state.total_cost(), "turn completed");

            // Halting predicates, evaluated after each completed turn. When
            // the credit limit is crossed mid-turn, the turn's remaining
            // phases still ran (state consistency); the halt lands here, so
            // no phase of the next turn ever executes.
            if let Some(limit) = self.config.credit_limit {
                if state.total_cost() > limit {
                    return self.halt_run(state, HaltReason::CreditLimit).await;
                }
            }
        }

        let state = state
            .with_status(ScenarioStatus::Completed)
            .with_completed();
        upsert_state(self.store.as_ref(), &state).await?;
        self.emit(&run_id, EventKind::ScenarioFinished { turn: state.turn });
        tracing::info!(run_id = %run_id, turn = state.turn, "run completed");
        Ok(state)
    }

    /// Run one phase with the configured retry budget. Exhausting the
    /// budget fails the run with diagnostic state persisted.
    async fn execute_phase(
        &self,
        phase: &dyn crate::phase::Phase,
        kind: PhaseKind,
        state: ScenarioState,
        turn: u64,
    ) -> Result<ScenarioState, RunnerError> {
        let run_id = state.run_id.clone();
        let state = state.with_phase(Some(kind));

        let mut attempt: u32 = 0;
        loop {
            // Each attempt gets a ledger seeded from the pre-attempt record
            // list, so a retried phase never double-appends what its failed
            // attempt already settled.
            let cx = PhaseContext {
                run_id: run_id.clone(),
                turn,
                bus: Arc::clone(&self.bus),
                ledger: Arc::new(CostLedger::with_records(
                    self.pricing.clone(),
                    state.costs.clone(),
                )),
            };
            match phase.execute(state.clone(), &cx).await {
                Ok(next) => return Ok(next),
                Err(error) if attempt < self.config.max_phase_retries => {
                    attempt += 1;
                    tracing::warn!(
                        run_id = %run_id,
                        phase = %kind,
                        turn,
                        attempt,
                        max = self.config.max_phase_retries,
                        %error,
                        "phase failed; retrying"
                    );
                }
                Err(error) => {
                    let attempts = attempt + 1;
                    let failed = state
                        .with_status(ScenarioStatus::Failed)
                        .with_completed()
                        .with_metadata(
                            "failure",
                            serde_json::json!({
                                "phase": kind.encode(),
                                "turn": turn,
                                "attempts": attempts,
                                "error": error.to_string(),
                            }),
                        );
                    upsert_state(self.store.as_ref(), &failed).await?;
                    self.emit(
                        &run_id,
                        EventKind::ScenarioFailed {
                            turn,
                            error: error.to_string(),
                        },
                    );
                    tracing::error!(
                        run_id = %run_id,
                        phase = %kind,
                        turn,
                        attempts,
                        %error,
                        "phase failed; run marked Failed"
                    );
                    return Err(RunnerError::PhaseFailed {
                        phase: kind,
                        turn,
                        attempts,
                        source: error,
                    });
                }
            }
        }
    }
}
