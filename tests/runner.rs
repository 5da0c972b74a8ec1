use std::sync::Arc;
use std::time::Duration;

use turnloom::event_bus::{EventKind, EventTopic, MemoryHandler};
use turnloom::runtime::RunnerConfig;
use turnloom::runtime::store::{InMemorySnapshotStore, SnapshotStore};
use turnloom::state::{ActorState, ScenarioState};
use turnloom::types::{HaltReason, PhaseKind, ScenarioStatus};

mod common;

use common::{COST_PER_CALL, MockModelClient, build_runner, two_actor_state};

/// Calls per turn with the standard pipeline: one decision per actor plus
/// the world update.
const CALLS_PER_TURN: f64 = 3.0;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_actors_three_turns_end_to_end() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(
        client.clone(),
        store.clone(),
        RunnerConfig::default().with_end_turn(3),
    );

    let final_state = runner
        .run(two_actor_state("run-e2e"))
        .await
        .expect("run completes");

    assert_eq!(final_state.status, ScenarioStatus::Completed);
    assert_eq!(final_state.turn, 3);
    assert!(final_state.started_at.is_some());
    assert!(final_state.completed_at.is_some());

    // Exactly 3 world snapshots and 6 decision records in the archive.
    let doc = store
        .load("run-e2e")
        .await
        .expect("load")
        .expect("document exists");
    assert_eq!(doc.turns.len(), 3);
    let decision_count: usize = doc.turns.values().map(|t| t.decisions.len()).sum();
    assert_eq!(decision_count, 6);
    for (turn, artifacts) in &doc.turns {
        assert_eq!(artifacts.world.turn, *turn);
        assert!(!artifacts.world.narrative.is_empty());
    }

    // Deterministic cost: 3 calls per turn, 3 turns.
    let expected = 3.0 * CALLS_PER_TURN * COST_PER_CALL;
    assert!((final_state.total_cost() - expected).abs() < 1e-9);
    assert_eq!(final_state.costs.len(), 9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn staggered_completion_still_merges_in_declaration_order() {
    let store = Arc::new(InMemorySnapshotStore::new());
    // The first-declared actor answers slowest; completion order is
    // reversed from declaration order.
    let client = Arc::new(
        MockModelClient::new()
            .with_delay("mock-slow", Duration::from_millis(120))
            .with_delay("mock-fast", Duration::from_millis(5)),
    );
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default().with_end_turn(1),
    );

    let initial = ScenarioState::builder()
        .with_scenario_id("stagger")
        .with_run_id("run-stagger")
        .with_actor(ActorState::new("tortoise", "TO", "mock-slow"))
        .with_actor(ActorState::new("hare", "HA", "mock-fast"))
        .with_world("A race is about to begin.")
        .build();

    runner.run(initial).await.expect("run completes");

    let doc = store.load("run-stagger").await.unwrap().unwrap();
    let order: Vec<&str> = doc.turns[&1]
        .decisions
        .iter()
        .map(|d| d.actor.as_str())
        .collect();
    assert_eq!(order, vec!["tortoise", "hare"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn crossing_the_credit_limit_halts_before_the_next_turn() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    // One turn costs 0.24; the limit is crossed during turn 2 and the halt
    // lands at the turn boundary.
    let limit = 1.25 * CALLS_PER_TURN * COST_PER_CALL;
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default().with_end_turn(10).with_credit_limit(limit),
    );
    let events = MemoryHandler::new();
    runner.bus().subscribe_all(events.clone());

    let final_state = runner
        .run(two_actor_state("run-credit"))
        .await
        .expect("halted, not failed");

    assert_eq!(
        final_state.status,
        ScenarioStatus::Halted(HaltReason::CreditLimit)
    );
    assert_eq!(final_state.turn, 2, "halt lands after the crossing turn");

    let captured = events.snapshot();
    // The halted turn completed all of its phases...
    assert!(captured.iter().any(|e| matches!(
        e.kind,
        EventKind::TurnCompleted { turn: 2 }
    )));
    // ...but no phase of turn 3 ever started.
    assert!(!captured.iter().any(|e| matches!(
        e.kind,
        EventKind::TurnStarted { turn: 3 }
            | EventKind::PhaseCompleted { turn: 3, .. }
            | EventKind::PhaseSkipped { turn: 3, .. }
    )));
    // The warning fired before the halt.
    assert!(captured
        .iter()
        .any(|e| matches!(e.kind, EventKind::CreditWarning { .. })));

    // The halted snapshot is durable and positioned at the completed turn.
    let doc = store.load("run-credit").await.unwrap().unwrap();
    assert_eq!(doc.state.turn, 2);
    assert_eq!(doc.turns.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unregistered_phases_emit_skipped_events() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(
        client,
        store,
        RunnerConfig::default().with_end_turn(1),
    );
    let events = MemoryHandler::new();
    runner.bus().subscribe(EventTopic::PhaseSkipped, events.clone());

    runner
        .run(two_actor_state("run-skip"))
        .await
        .expect("run completes");

    // Communication is deliberately unregistered in the standard pipeline.
    let skipped: Vec<PhaseKind> = events
        .snapshot()
        .iter()
        .map(|e| match e.kind {
            EventKind::PhaseSkipped { phase, .. } => phase,
            _ => panic!("unexpected event"),
        })
        .collect();
    assert_eq!(skipped, vec![PhaseKind::Communication]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_failing_actor_degrades_without_failing_the_phase() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new().with_failing_model("mock-broken"));
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default().with_end_turn(1),
    );
    let events = MemoryHandler::new();
    runner.bus().subscribe(EventTopic::ValidationIssue, events.clone());

    let initial = ScenarioState::builder()
        .with_scenario_id("degraded")
        .with_run_id("run-degraded")
        .with_actor(ActorState::new("atlas", "AT", common::ACTOR_MODEL))
        .with_actor(ActorState::new("glitch", "GL", "mock-broken"))
        .with_world("A storm approaches.")
        .build();

    let final_state = runner.run(initial).await.expect("phase is not failed");
    assert_eq!(final_state.status, ScenarioStatus::Completed);

    let doc = store.load("run-degraded").await.unwrap().unwrap();
    let decisions = &doc.turns[&1].decisions;
    assert_eq!(decisions.len(), 2);
    assert!(!decisions[0].is_degraded(), "healthy actor unaffected");
    assert!(decisions[1].is_degraded(), "failed actor recorded degraded");

    // Validation surfaced the degradation without aborting the turn.
    assert!(events.snapshot().iter().any(|e| matches!(
        &e.kind,
        EventKind::ValidationIssue { actor: Some(actor), .. } if actor == "glitch"
    )));
    // No ledger entry for the failed call; the healthy actor and the world
    // update still billed.
    assert_eq!(final_state.costs.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduled_exogenous_events_trigger_once_and_are_archived() {
    use turnloom::cache::{CacheConfig, ResponseCache};
    use turnloom::config::{ExogenousEvent, PromptBuilder};
    use turnloom::ledger::PricingTable;
    use turnloom::model::ModelInvoker;
    use turnloom::phases::{DecisionPhase, PersistencePhase, ValidationPhase, WorldUpdatePhase};
    use turnloom::pipeline::PipelineBuilder;
    use turnloom::runtime::ScenarioRunner;

    let store = Arc::new(InMemorySnapshotStore::new());
    let client: Arc<dyn turnloom::model::ModelClient> = Arc::new(MockModelClient::new());
    let cache = Arc::new(ResponseCache::new(CacheConfig::default()));
    let invoker = Arc::new(ModelInvoker::new(client, cache, common::pricing()));
    let prompts: Arc<dyn PromptBuilder> = Arc::new(common::TestPromptBuilder);
    let events = vec![ExogenousEvent {
        id: "storm-1".to_string(),
        turn: 2,
        description: "A storm floods the pass.".to_string(),
    }];

    let dyn_store: Arc<dyn SnapshotStore> = store.clone();
    let pipeline = PipelineBuilder::new()
        .register(DecisionPhase::new(Arc::clone(&invoker), Arc::clone(&prompts)))
        .register(WorldUpdatePhase::new(
            Arc::clone(&invoker),
            Arc::clone(&prompts),
            common::WORLD_MODEL,
            events,
        ))
        .register(ValidationPhase::new())
        .register(PersistencePhase::new(dyn_store))
        .build();
    let runner = ScenarioRunner::new(
        pipeline,
        store.clone(),
        common::pricing(),
        RunnerConfig::default().with_end_turn(3),
    );

    let final_state = runner
        .run(two_actor_state("run-events"))
        .await
        .expect("run completes");

    assert_eq!(final_state.triggered_events, vec!["storm-1".to_string()]);

    // The event is attributed to the turn that fired it, and only that one.
    let doc = store.load("run-events").await.unwrap().unwrap();
    assert!(doc.turns[&1].triggered_events.is_empty());
    assert_eq!(doc.turns[&2].triggered_events, vec!["storm-1".to_string()]);
    assert!(doc.turns[&3].triggered_events.is_empty());
    assert_eq!(
        doc.turns[&2].world.metadata.get("injected_events"),
        Some(&serde_json::json!(["storm-1"]))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn terminal_states_are_rejected_by_run() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(client, store, RunnerConfig::default().with_end_turn(2));

    let completed = two_actor_state("run-term").with_status(ScenarioStatus::Completed);
    assert!(runner.run(completed).await.is_err());

    let failed = two_actor_state("run-term2").with_status(ScenarioStatus::Failed);
    assert!(runner.run(failed).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_is_honored_at_a_phase_boundary() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default().with_end_turn(50),
    );

    // Cancel before the run even starts its first turn: the halt must land
    // without executing anything.
    runner.control().request_cancel();
    let final_state = runner
        .run(two_actor_state("run-cancel"))
        .await
        .expect("halted");

    assert_eq!(
        final_state.status,
        ScenarioStatus::Halted(HaltReason::Manual)
    );
    assert_eq!(final_state.turn, 0);
    assert!(final_state.costs.is_empty());
    let doc = store.load("run-cancel").await.unwrap().unwrap();
    assert_eq!(
        doc.state.status,
        ScenarioStatus::Halted(HaltReason::Manual)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pause_is_voluntary_and_trivially_resumable() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default().with_end_turn(2),
    );

    runner.control().request_pause();
    let paused = runner
        .run(two_actor_state("run-pause"))
        .await
        .expect("pauses cleanly");
    assert_eq!(paused.status, ScenarioStatus::Paused);
    assert_eq!(paused.turn, 0);

    // Resume clears the pause request and runs to completion.
    let final_state = runner.resume("run-pause").await.expect("resumes");
    assert_eq!(final_state.status, ScenarioStatus::Completed);
    assert_eq!(final_state.turn, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exhausted_phase_retries_fail_the_run_with_diagnostics() {
    let store = Arc::new(InMemorySnapshotStore::new());
    // The world model rejects every call with a permanent error, so the
    // WorldUpdate phase fails on every attempt.
    let client = Arc::new(MockModelClient::new().with_failing_model(common::WORLD_MODEL));
    let runner = build_runner(
        client,
        store.clone(),
        RunnerConfig::default()
            .with_end_turn(2)
            .with_max_phase_retries(1),
    );

    let result = runner.run(two_actor_state("run-fail")).await;
    assert!(result.is_err(), "exhausted retries must fail the run");

    // Diagnostic state is persisted with a terminal Failed status.
    let doc = store.load("run-fail").await.unwrap().unwrap();
    assert_eq!(doc.state.status, ScenarioStatus::Failed);
    let failure = doc.state.metadata.get("failure").expect("failure metadata");
    assert_eq!(failure["phase"], "WorldUpdate");
    assert_eq!(failure["attempts"], 2);

    // Failed runs are terminal: resume is rejected.
    assert!(runner.resume("run-fail").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dry_run_executes_nothing_billable() {
    let store = Arc::new(InMemorySnapshotStore::new());
    let client = Arc::new(MockModelClient::new());
    let runner = build_runner(
        client.clone(),
        store,
        RunnerConfig::default().with_end_turn(2).with_dry_run(true),
    );
    let events = MemoryHandler::new();
    runner.bus().subscribe(EventTopic::PhaseSkipped, events.clone());

    let final_state = runner
        .run(two_actor_state("run-dry"))
        .await
        .expect("dry run completes");

    assert_eq!(final_state.status, ScenarioStatus::Completed);
    assert_eq!(client.calls(), 0);
    assert!(final_state.costs.is_empty());
    // Every phase of every turn reported itself as skipped.
    assert_eq!(events.snapshot().len(), 2 * PhaseKind::ORDER.len());
}
