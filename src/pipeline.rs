//! Pipeline construction for the fixed five-phase turn sequence.
//!
//! This module contains [`PipelineBuilder`] and its fluent API for
//! registering phase implementations before building an executable
//! [`Pipeline`]. Phases are polymorphic over one capability
//! ([`Phase::execute`](crate::phase::Phase::execute)) and selected through
//! this explicit registry, never through inheritance.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::phase::Phase;
use crate::types::PhaseKind;

/// Builder for assembling the phase registry with a fluent API.
///
/// The execution order is fixed by [`PhaseKind::ORDER`]; registration only
/// decides which slots are filled. A slot left empty is skipped at runtime
/// with a `PhaseSkipped` event, so disabled phases stay visible to
/// observers.
///
/// Registering a second implementation for the same slot replaces the first
/// — the last registration wins.
///
/// # Examples
///
/// ```rust,no_run
/// use turnloom::pipeline::PipelineBuilder;
/// # use async_trait::async_trait;
/// # use turnloom::phase::{Phase, PhaseContext, PhaseError};
/// # use turnloom::state::ScenarioState;
/// # use turnloom::types::PhaseKind;
/// # struct NoOpValidation;
/// # #[async_trait]
/// # impl Phase for NoOpValidation {
/// #     fn kind(&self) -> PhaseKind { PhaseKind::Validation }
/// #     async fn execute(&self, s: ScenarioState, _: &PhaseContext) -> Result<ScenarioState, PhaseError> { Ok(s) }
/// # }
///
/// let pipeline = PipelineBuilder::new()
///     .register(NoOpValidation)
///     .build();
///
/// assert_eq!(pipeline.registered().len(), 1);
/// ```
pub struct PipelineBuilder {
    phases: FxHashMap<PhaseKind, Arc<dyn Phase>>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineBuilder {
    /// Creates a new, empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            phases: FxHashMap::default(),
        }
    }

    /// Registers a phase implementation in the slot named by its
    /// [`Phase::kind`].
    #[must_use]
    pub fn register<P: Phase + 'static>(mut self, phase: P) -> Self {
        self.phases.insert(phase.kind(), Arc::new(phase));
        self
    }

    /// Registers an already-shared phase implementation.
    #[must_use]
    pub fn register_arc(mut self, phase: Arc<dyn Phase>) -> Self {
        self.phases.insert(phase.kind(), phase);
        self
    }

    /// Builds the immutable pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            phases: self.phases,
        }
    }
}

/// The immutable phase registry driven by the orchestrator.
///
/// One `Pipeline` can be shared across many concurrent runs; phase
/// implementations are required to be `Send + Sync` and hold their own
/// collaborators (model invoker, prompt builder, snapshot store).
#[derive(Clone)]
pub struct Pipeline {
    phases: FxHashMap<PhaseKind, Arc<dyn Phase>>,
}

impl Pipeline {
    /// The registered implementation for a slot, if any.
    #[must_use]
    pub fn phase(&self, kind: PhaseKind) -> Option<&Arc<dyn Phase>> {
        self.phases.get(&kind)
    }

    /// The slots that have an implementation, in execution order.
    #[must_use]
    pub fn registered(&self) -> Vec<PhaseKind> {
        PhaseKind::ORDER
            .into_iter()
            .filter(|kind| self.phases.contains_key(kind))
            .collect()
    }
}
