//! Shared fixtures for integration tests: a deterministic mock model
//! client, a minimal prompt builder, and harness constructors.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;

use turnloom::cache::{CacheConfig, ResponseCache};
use turnloom::config::{PlannedExchange, PromptBuilder};
use turnloom::ledger::PricingTable;
use turnloom::model::{ModelCallError, ModelClient, ModelInvoker, ModelOutput};
use turnloom::phases::{
    CommunicationPhase, DecisionPhase, PersistencePhase, ValidationPhase, WorldUpdatePhase,
};
use turnloom::pipeline::{Pipeline, PipelineBuilder};
use turnloom::runtime::store::{InMemorySnapshotStore, SnapshotStore};
use turnloom::runtime::{RunnerConfig, ScenarioRunner};
use turnloom::state::{ActorState, ScenarioState};

pub const ACTOR_MODEL: &str = "mock-small";
pub const WORLD_MODEL: &str = "mock-world";

/// Fixed token usage per mocked call keeps per-turn cost exactly
/// predictable: see [`COST_PER_CALL`].
pub const INPUT_TOKENS: u64 = 100;
pub const OUTPUT_TOKENS: u64 = 20;

/// With the [`pricing`] table below: 100/1000 * 0.5 + 20/1000 * 1.5.
pub const COST_PER_CALL: f64 = 0.08;

/// Deterministic scripted model client.
///
/// Responses are a pure function of the prompt; per-model delays and
/// always-fail models let tests stagger completion order and exercise
/// degraded-decision isolation.
#[derive(Default)]
pub struct MockModelClient {
    delays: FxHashMap<String, Duration>,
    failing: Vec<String>,
    calls: AtomicU64,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, model: &str, delay: Duration) -> Self {
        self.delays.insert(model.to_string(), delay);
        self
    }

    pub fn with_failing_model(mut self, model: &str) -> Self {
        self.failing.push(model.to_string());
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn call(&self, model: &str, prompt: &str) -> Result<ModelOutput, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(model) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.iter().any(|m| m == model) {
            return Err(ModelCallError::Invalid {
                status: 400,
                message: format!("model {model} is scripted to fail"),
            });
        }
        Ok(ModelOutput {
            text: format!("REASONING: weighing the situation\nACTION: respond[{}]", prompt.len()),
            input_tokens: INPUT_TOKENS,
            output_tokens: OUTPUT_TOKENS,
        })
    }
}

/// Minimal deterministic prompt builder. Prompts embed the run, turn, and
/// actor so every distinct call has a distinct cache fingerprint.
pub struct TestPromptBuilder;

impl PromptBuilder for TestPromptBuilder {
    fn decision_prompt(&self, state: &ScenarioState, actor: &ActorState) -> String {
        format!(
            "[decision] scenario={} turn={} actor={} world_len={}",
            state.scenario_id,
            state.turn,
            actor.name,
            state.world.narrative.len()
        )
    }

    fn communication_prompt(
        &self,
        state: &ScenarioState,
        sender: &ActorState,
        recipients: &[String],
    ) -> String {
        format!(
            "[comm] turn={} sender={} recipients={}",
            state.turn,
            sender.name,
            recipients.join(",")
        )
    }

    fn world_prompt(&self, state: &ScenarioState, injected_events: &[String]) -> String {
        format!(
            "[world] scenario={} turn={} decisions={} events={}",
            state.scenario_id,
            state.turn,
            state.decisions.len(),
            injected_events.join(";")
        )
    }
}

pub fn pricing() -> PricingTable {
    PricingTable::new()
        .with_model(ACTOR_MODEL, 0.5, 1.5)
        .with_model(WORLD_MODEL, 0.5, 1.5)
        .with_model("mock-slow", 0.5, 1.5)
        .with_model("mock-fast", 0.5, 1.5)
        .with_model("mock-broken", 0.5, 1.5)
}

/// Standard pipeline: Decision, WorldUpdate, Validation, Persistence.
/// Communication stays unregistered so skipped-phase events are exercised.
pub fn standard_pipeline(client: Arc<dyn ModelClient>, store: Arc<dyn SnapshotStore>) -> Pipeline {
    pipeline_with_plan(client, store, None)
}

/// Like [`standard_pipeline`], plus a CommunicationPhase when a plan is
/// given.
pub fn pipeline_with_plan(
    client: Arc<dyn ModelClient>,
    store: Arc<dyn SnapshotStore>,
    plan: Option<Vec<PlannedExchange>>,
) -> Pipeline {
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let invoker = Arc::new(ModelInvoker::new(client, cache, pricing()));
    let prompts: Arc<dyn PromptBuilder> = Arc::new(TestPromptBuilder);

    let mut builder = PipelineBuilder::new()
        .register(DecisionPhase::new(Arc::clone(&invoker), Arc::clone(&prompts)))
        .register(WorldUpdatePhase::new(
            Arc::clone(&invoker),
            Arc::clone(&prompts),
            WORLD_MODEL,
            Vec::new(),
        ))
        .register(ValidationPhase::new())
        .register(PersistencePhase::new(store));
    if let Some(plan) = plan {
        builder = builder.register(CommunicationPhase::new(
            Arc::clone(&invoker),
            Arc::clone(&prompts),
            plan,
        ));
    }
    builder.build()
}

pub fn build_runner(
    client: Arc<dyn ModelClient>,
    store: Arc<InMemorySnapshotStore>,
    config: RunnerConfig,
) -> ScenarioRunner {
    let dyn_store: Arc<dyn SnapshotStore> = store.clone();
    let pipeline = standard_pipeline(client, dyn_store);
    ScenarioRunner::new(pipeline, store, pricing(), config)
}

pub fn two_actor_state(run_id: &str) -> ScenarioState {
    ScenarioState::builder()
        .with_scenario_id("border-dispute")
        .with_run_id(run_id)
        .with_actor(
            ActorState::new("atlas", "AT", ACTOR_MODEL)
                .with_goals(vec!["secure the pass".to_string()]),
        )
        .with_actor(
            ActorState::new("borealis", "BO", ACTOR_MODEL)
                .with_goals(vec!["open trade".to_string()]),
        )
        .with_world("Two republics share a contested mountain pass.")
        .build()
}
