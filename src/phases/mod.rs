//! Built-in implementations of the five pipeline phases.
//!
//! Each phase holds its own collaborators (model invoker, prompt builder,
//! snapshot store) and is registered explicitly on a
//! [`PipelineBuilder`](crate::pipeline::PipelineBuilder). Scenarios that
//! need different behavior register their own [`Phase`](crate::phase::Phase)
//! implementations instead.

pub mod communication;
pub mod decision;
pub mod persistence;
pub mod validation;
pub mod world_update;

pub use communication::CommunicationPhase;
pub use decision::DecisionPhase;
pub use persistence::PersistencePhase;
pub use validation::ValidationPhase;
pub use world_update::WorldUpdatePhase;
