//! # Turnloom: Turn-Based Multi-Actor Simulation Engine
//!
//! Turnloom executes multi-actor, turn-based simulations where independent
//! decision-making agents act on a shared evolving world state, accumulate
//! metered cost, and can be paused, resumed, or forked from any completed
//! turn.
//!
//! ## Core Concepts
//!
//! - **State**: an immutable [`ScenarioState`](state::ScenarioState) threaded
//!   explicitly through phases; every transform returns a new instance
//! - **Phases**: the fixed per-turn sequence Communication → Decision →
//!   WorldUpdate → Validation → Persistence, filled through an explicit
//!   registry ([`pipeline::PipelineBuilder`])
//! - **Orchestrator**: [`runtime::ScenarioRunner`] drives turns, applies
//!   halting predicates, and honors pause/cancel only at phase boundaries
//! - **Events**: [`event_bus::EventBus`] fans run events out to per-topic
//!   handlers with failure isolation and a bounded replay history
//! - **Cache**: [`cache::ResponseCache`] deduplicates billed calls by
//!   content fingerprint with TTL, LRU eviction, and a durable mirror
//! - **Ledger**: [`ledger::CostLedger`] prices every billed call fail-closed
//!   and derives all totals by summation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use turnloom::ledger::PricingTable;
//! use turnloom::pipeline::PipelineBuilder;
//! use turnloom::runtime::store::InMemorySnapshotStore;
//! use turnloom::runtime::{RunnerConfig, ScenarioRunner};
//! use turnloom::state::{ActorState, ScenarioState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let initial = ScenarioState::builder()
//!     .with_scenario_id("trade-summit")
//!     .with_actor(ActorState::new("atlas", "AT", "mock-small"))
//!     .with_actor(ActorState::new("borealis", "BO", "mock-small"))
//!     .with_world("Two republics negotiate a river treaty.")
//!     .build();
//!
//! let runner = ScenarioRunner::new(
//!     PipelineBuilder::new().build(), // register phases here
//!     Arc::new(InMemorySnapshotStore::new()),
//!     PricingTable::new().with_model("mock-small", 0.5, 1.5),
//!     RunnerConfig::default().with_end_turn(3).with_credit_limit(1.0),
//! );
//!
//! let final_state = runner.run(initial).await?;
//! println!("finished at turn {} with status {}", final_state.turn, final_state.status);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`state`] - Immutable scenario state and its pure transforms
//! - [`comms`] - Communication records and scoping
//! - [`types`] - Status, phase, and metric vocabulary
//! - [`phase`] / [`pipeline`] - Phase capability trait and explicit registry
//! - [`phases`] - Built-in phase implementations
//! - [`event_bus`] - Typed pub/sub with replay history
//! - [`model`] - Model invocation seam, retry policy, cache-aware invoker
//! - [`cache`] - Content-addressed response cache
//! - [`ledger`] - Fail-closed cost accounting
//! - [`runtime`] - Orchestration, snapshots, branching, run pool
//! - [`config`] - Validated collaborator input contracts

pub mod cache;
pub mod comms;
pub mod config;
pub mod event_bus;
pub mod ledger;
pub mod model;
pub mod phase;
pub mod phases;
pub mod pipeline;
pub mod runtime;
pub mod state;
pub mod telemetry;
pub mod types;
pub mod utils;
