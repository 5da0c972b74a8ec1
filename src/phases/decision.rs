//! Concurrent per-actor decision making.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::json;
use tokio::task::JoinHandle;

use crate::config::PromptBuilder;
use crate::event_bus::EventKind;
use crate::model::{InvokeOutcome, ModelCallError, ModelInvoker};
use crate::phase::{Phase, PhaseContext, PhaseError};
use crate::state::{ActorState, Decision, ScenarioState};
use crate::types::PhaseKind;

/// Fans out one independent task per actor, then merges the results into
/// state in **declared actor order**, not completion order, so the output
/// is deterministic irrespective of scheduling jitter.
///
/// A single actor's failure (exhausted retries, task panic) is isolated:
/// it is recorded as a degraded [`Decision`] and never fails the phase.
pub struct DecisionPhase {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptBuilder>,
}

impl DecisionPhase {
    #[must_use]
    pub fn new(invoker: Arc<ModelInvoker>, prompts: Arc<dyn PromptBuilder>) -> Self {
        Self { invoker, prompts }
    }
}

#[async_trait]
impl Phase for DecisionPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Decision
    }

    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError> {
        let turn = cx.turn;
        let shared = Arc::new(state.clone());

        // Fan-out: one task per actor, spawned in declaration order.
        let mut actors: Vec<Arc<ActorState>> = Vec::with_capacity(state.actor_order.len());
        let mut handles: Vec<JoinHandle<Result<InvokeOutcome, ModelCallError>>> =
            Vec::with_capacity(state.actor_order.len());
        for name in &state.actor_order {
            let Some(actor) = state.actors.get(name) else {
                continue;
            };
            let actor = Arc::clone(actor);
            let shared = Arc::clone(&shared);
            let invoker = Arc::clone(&self.invoker);
            let prompts = Arc::clone(&self.prompts);
            let task_actor = Arc::clone(&actor);
            handles.push(tokio::spawn(async move {
                let prompt = prompts.decision_prompt(&shared, &task_actor);
                invoker.invoke(&task_actor.model, &prompt, false).await
            }));
            actors.push(actor);
        }

        // Fan-in: join_all preserves spawn order, so the merge below follows
        // declaration order regardless of completion order.
        let results = join_all(handles).await;

        let mut state = state;
        for (actor, joined) in actors.into_iter().zip(results) {
            let result = match joined {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_error) => Err(format!("decision task aborted: {join_error}")),
            };

            let decision = match result {
                Ok(outcome) => {
                    if !outcome.cached {
                        let record = cx.ledger.record(
                            Some(&actor.name),
                            PhaseKind::Decision,
                            turn,
                            &actor.model,
                            outcome.input_tokens,
                            outcome.output_tokens,
                        )?;
                        cx.emit(EventKind::CostIncurred {
                            actor: Some(actor.name.clone()),
                            phase: PhaseKind::Decision,
                            model: actor.model.clone(),
                            cost: record.cost,
                        });
                        state = state.with_cost(record);
                    }

                    let parsed = parse_decision_text(&outcome.text);
                    let mut decision = Decision::new(
                        &actor.name,
                        turn,
                        actor.goals.clone(),
                        &parsed.reasoning,
                        &parsed.action,
                    )
                    .with_metadata("model", json!(actor.model));
                    if parsed.fallback {
                        decision = decision.with_metadata("parse_fallback", json!(true));
                    }
                    decision
                }
                Err(error) => {
                    tracing::warn!(
                        run_id = %cx.run_id,
                        actor = %actor.name,
                        turn,
                        %error,
                        "actor decision failed; recording degraded decision"
                    );
                    Decision::degraded(&actor.name, turn, actor.goals.clone(), &error)
                }
            };

            cx.emit(EventKind::DecisionRecorded {
                actor: actor.name.clone(),
                turn,
                degraded: decision.is_degraded(),
            });
            let updated = actor.with_decision(decision.clone());
            state = state.with_decision(decision).with_actor(updated);
        }

        Ok(state)
    }
}

struct ParsedDecision {
    reasoning: String,
    action: String,
    fallback: bool,
}

/// Split a model response into reasoning and action.
///
/// Expected shape is a `REASONING:` section followed by an `ACTION:`
/// section. Malformed output never aborts the turn: the whole response
/// becomes the action and the decision is flagged `parse_fallback` for
/// downstream review.
fn parse_decision_text(text: &str) -> ParsedDecision {
    if let Some((action_pos, marker_len)) = find_first(text, &["ACTION:", "Action:", "action:"]) {
        let mut reasoning = text[..action_pos].trim();
        for marker in ["REASONING:", "Reasoning:", "reasoning:"] {
            reasoning = reasoning.strip_prefix(marker).unwrap_or(reasoning).trim();
        }
        let action = text[action_pos + marker_len..].trim().to_string();
        if !action.is_empty() {
            return ParsedDecision {
                reasoning: reasoning.to_string(),
                action,
                fallback: false,
            };
        }
    }
    ParsedDecision {
        reasoning: String::new(),
        action: text.trim().to_string(),
        fallback: true,
    }
}

fn find_first(text: &str, markers: &[&str]) -> Option<(usize, usize)> {
    markers
        .iter()
        .filter_map(|marker| text.find(marker).map(|pos| (pos, marker.len())))
        .min_by_key(|(pos, _)| *pos)
}
