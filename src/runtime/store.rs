//! Durable snapshot storage for run documents.
//!
//! After each completed turn the orchestrator writes the **entire**
//! [`RunDocument`] — full [`ScenarioState`] plus the per-turn artifact
//! archive — keyed by run id. The file backend writes a temporary sibling
//! and renames it into place, so a crash mid-write never corrupts the last
//! good snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::persistence::{PersistedRun, PersistedTurnArtifacts, PersistenceError};
use crate::comms::Communication;
use crate::state::{Decision, ScenarioState, WorldState};

/// The outputs of one completed turn, archived for exports and branching.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnArtifacts {
    /// Turn the artifacts belong to.
    pub turn: u64,
    /// World snapshot produced by the turn.
    pub world: WorldState,
    /// Decisions in declared actor order.
    pub decisions: Vec<Decision>,
    /// The turn's communication traffic.
    pub communications: Vec<Communication>,
    /// Exogenous event ids first triggered in this turn.
    pub triggered_events: Vec<String>,
}

/// One run's durable document: the full state plus the turn archive.
#[derive(Clone, Debug, PartialEq)]
pub struct RunDocument {
    /// The entire scenario state as of the last write.
    pub state: ScenarioState,
    /// Archived artifacts keyed by turn number.
    pub turns: BTreeMap<u64, TurnArtifacts>,
}

impl RunDocument {
    /// Wraps a state with an empty archive.
    #[must_use]
    pub fn new(state: ScenarioState) -> Self {
        Self {
            state,
            turns: BTreeMap::new(),
        }
    }

    /// Inserts (or overwrites) one turn's artifacts. Keying by turn is what
    /// makes re-executed turns after a resume idempotent.
    pub fn record_turn(&mut self, artifacts: TurnArtifacts) {
        self.turns.insert(artifacts.turn, artifacts);
    }

    /// Exogenous event ids triggered at or before `turn`, in archive order.
    #[must_use]
    pub fn triggered_events_through(&self, turn: u64) -> Vec<String> {
        self.turns
            .range(..=turn)
            .flat_map(|(_, artifacts)| artifacts.triggered_events.iter().cloned())
            .collect()
    }
}

impl From<&RunDocument> for PersistedRun {
    fn from(doc: &RunDocument) -> Self {
        PersistedRun {
            state: (&doc.state).into(),
            turns: doc
                .turns
                .iter()
                .map(|(turn, artifacts)| {
                    (
                        *turn,
                        PersistedTurnArtifacts {
                            turn: artifacts.turn,
                            world: (&artifacts.world).into(),
                            decisions: artifacts.decisions.iter().map(Into::into).collect(),
                            communications: artifacts.communications.clone(),
                            triggered_events: artifacts.triggered_events.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl TryFrom<PersistedRun> for RunDocument {
    type Error = PersistenceError;

    fn try_from(p: PersistedRun) -> Result<Self, PersistenceError> {
        let state = ScenarioState::try_from(p.state)?;
        let turns = p
            .turns
            .into_iter()
            .map(|(turn, artifacts)| {
                (
                    turn,
                    TurnArtifacts {
                        turn: artifacts.turn,
                        world: artifacts.world.into(),
                        decisions: artifacts.decisions.into_iter().map(Into::into).collect(),
                        communications: artifacts.communications,
                        triggered_events: artifacts.triggered_events,
                    },
                )
            })
            .collect();
        Ok(Self { state, turns })
    }
}

/// Snapshot store failures.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("snapshot I/O failed: {source}")]
    #[diagnostic(
        code(turnloom::store::io),
        help("Check that the snapshot directory exists and is writable.")
    )]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("snapshot encoding failed: {source}")]
    #[diagnostic(code(turnloom::store::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(turnloom::store::conversion))]
    Conversion(#[from] PersistenceError),
}

/// Pluggable durable persistence for run documents.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Atomically replace the document for `doc.state.run_id`.
    async fn save(&self, doc: &RunDocument) -> Result<(), StoreError>;

    /// Load the latest document for a run, if one exists.
    async fn load(&self, run_id: &str) -> Result<Option<RunDocument>, StoreError>;

    /// Run ids with a stored document.
    async fn list_runs(&self) -> Result<Vec<String>, StoreError>;
}

/// Load-modify-save helper: replace the stored state for a run, creating
/// the document if it does not exist yet. Used for status transitions
/// (pause, halt, failure) outside the persistence phase.
pub async fn upsert_state(
    store: &dyn SnapshotStore,
    state: &ScenarioState,
) -> Result<(), StoreError> {
    let mut doc = store
        .load(&state.run_id)
        .await?
        .unwrap_or_else(|| RunDocument::new(state.clone()));
    doc.state = state.clone();
    store.save(&doc).await
}

/// Volatile store for tests and development.
#[derive(Default)]
pub struct InMemorySnapshotStore {
    runs: Mutex<FxHashMap<String, RunDocument>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, doc: &RunDocument) -> Result<(), StoreError> {
        self.runs
            .lock()
            .insert(doc.state.run_id.clone(), doc.clone());
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunDocument>, StoreError> {
        Ok(self.runs.lock().get(run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.runs.lock().keys().cloned().collect())
    }
}

/// File-backed store: one JSON document per run under a root directory,
/// replaced atomically via write-temporary-then-rename.
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Open (creating if needed) the snapshot directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn document_path(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{run_id}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, doc: &RunDocument) -> Result<(), StoreError> {
        let persisted = PersistedRun::from(doc);
        let payload = serde_json::to_vec_pretty(&persisted)?;
        let run_id = &doc.state.run_id;
        let tmp = self.root.join(format!(".{run_id}.tmp"));
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, self.document_path(run_id))?;
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunDocument>, StoreError> {
        let path = self.document_path(run_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)?;
        let persisted: PersistedRun = serde_json::from_str(&raw)?;
        Ok(Some(RunDocument::try_from(persisted)?))
    }

    async fn list_runs(&self) -> Result<Vec<String>, StoreError> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    runs.push(stem.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}
