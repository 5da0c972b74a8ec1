//! Point-in-time branching: fork a new run from another run's completed
//! turn.
//!
//! A branch copies the source's turn artifacts up to the fork point,
//! truncates the cost and metric histories to that point, and recomputes
//! everything derived from them by construction — no precomputed aggregate
//! is ever copied forward, because none is ever stored.

use miette::Diagnostic;
use thiserror::Error;
use tracing::instrument;

use super::store::{RunDocument, SnapshotStore, StoreError};
use crate::state::ScenarioState;
use crate::types::ScenarioStatus;
use crate::utils::id_generator;

/// Parameters for a branch operation.
#[derive(Clone, Debug)]
pub struct BranchSpec {
    /// Run to fork from.
    pub source_run_id: String,
    /// Fork point: the last source turn the branch keeps (`T`); execution
    /// of the branch resumes at `T + 1`.
    pub turn: u64,
    /// Run id for the branch; a fresh one is generated when omitted.
    pub branch_run_id: Option<String>,
}

impl BranchSpec {
    #[must_use]
    pub fn new(source_run_id: &str, turn: u64) -> Self {
        Self {
            source_run_id: source_run_id.to_string(),
            turn,
            branch_run_id: None,
        }
    }

    /// Pins the branch run id (useful in tests).
    #[must_use]
    pub fn with_branch_run_id(mut self, run_id: &str) -> Self {
        self.branch_run_id = Some(run_id.to_string());
        self
    }
}

/// Branching failures.
#[derive(Debug, Error, Diagnostic)]
pub enum BranchError {
    #[error("source run not found: {run_id}")]
    #[diagnostic(code(turnloom::branch::source_not_found))]
    SourceNotFound { run_id: String },

    #[error("branch turn {requested} exceeds source turn {available}")]
    #[diagnostic(
        code(turnloom::branch::turn_out_of_range),
        help("A run can only be forked at a turn it has already completed.")
    )]
    TurnOutOfRange { requested: u64, available: u64 },

    #[error(transparent)]
    #[diagnostic(code(turnloom::branch::store))]
    Store(#[from] StoreError),
}

/// Fork `spec.source_run_id` at turn `spec.turn`, persist the new run, and
/// return its state (status `Running`, positioned so execution resumes at
/// `turn + 1`).
#[instrument(skip(store), err)]
pub async fn branch_run(
    store: &dyn SnapshotStore,
    spec: &BranchSpec,
) -> Result<ScenarioState, BranchError> {
    let source = store
        .load(&spec.source_run_id)
        .await?
        .ok_or_else(|| BranchError::SourceNotFound {
            run_id: spec.source_run_id.clone(),
        })?;

    if spec.turn > source.state.turn {
        return Err(BranchError::TurnOutOfRange {
            requested: spec.turn,
            available: source.state.turn,
        });
    }

    let branch_run_id = spec
        .branch_run_id
        .clone()
        .unwrap_or_else(id_generator::generate_run_id);

    // Keep artifacts for turns 1..=T only.
    let turns: std::collections::BTreeMap<_, _> = source
        .turns
        .range(..=spec.turn)
        .map(|(turn, artifacts)| (*turn, artifacts.clone()))
        .collect();

    let mut state = source.state.clone();
    state.run_id = branch_run_id.clone();
    state.status = ScenarioStatus::Running;
    state.turn = spec.turn;
    state.phase = None;
    state.completed_at = None;

    // Truncate the record histories to the fork point. Aggregates are
    // derived by summation everywhere, so they follow automatically.
    state.costs.retain(|record| record.turn <= spec.turn);
    state.metrics.retain(|record| record.turn <= spec.turn);

    // Rewind turn-scoped collections and the world to the fork point.
    if let Some(artifacts) = turns.get(&spec.turn) {
        state.world = std::sync::Arc::new(artifacts.world.clone());
        state.communications = artifacts.communications.clone();
        state.decisions = artifacts
            .decisions
            .iter()
            .map(|d| (d.actor.clone(), d.clone()))
            .collect();
    } else {
        state.communications.clear();
        state.decisions.clear();
    }

    // Triggered exogenous events are archived per turn, so the branch keeps
    // exactly those fired by turns <= T.
    state.triggered_events = turns
        .values()
        .flat_map(|artifacts| artifacts.triggered_events.iter().cloned())
        .collect();

    // Rebuild each actor's rolling decision history from the retained
    // artifacts; the source's in-memory history may reflect later turns.
    for name in state.actor_order.clone() {
        let Some(mut rebuilt) = state.actors.get(&name).map(|a| a.as_ref().clone()) else {
            continue;
        };
        rebuilt.recent_decisions.clear();
        for (_, artifacts) in turns.range(..=spec.turn) {
            if let Some(decision) = artifacts.decisions.iter().find(|d| d.actor == name) {
                rebuilt = rebuilt.with_decision(decision.clone());
            }
        }
        state
            .actors
            .insert(name.clone(), std::sync::Arc::new(rebuilt));
    }

    // Branch provenance.
    state.metadata.insert(
        "branch_source_run".to_string(),
        serde_json::Value::String(spec.source_run_id.clone()),
    );
    state.metadata.insert(
        "branch_turn".to_string(),
        serde_json::Value::Number(spec.turn.into()),
    );

    let doc = RunDocument { state, turns };
    store.save(&doc).await?;
    tracing::info!(
        source = %spec.source_run_id,
        branch = %branch_run_id,
        turn = spec.turn,
        "branch created"
    );
    Ok(doc.state)
}
