//! Plan-driven inter-actor message exchange.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::join_all;
use tokio::task::JoinHandle;

use crate::comms::Communication;
use crate::config::{PlannedExchange, PromptBuilder};
use crate::event_bus::EventKind;
use crate::model::{InvokeOutcome, ModelCallError, ModelInvoker};
use crate::phase::{Phase, PhaseContext, PhaseError};
use crate::state::ScenarioState;
use crate::types::PhaseKind;

/// Executes the scenario's communication plan.
///
/// Exchanges run concurrently (one task per planned exchange) and merge
/// into state in **plan order**, so the turn's communication log is
/// deterministic irrespective of completion order. A single exchange's
/// failure is isolated: it is surfaced as a ValidationIssue event and the
/// remaining exchanges still land.
pub struct CommunicationPhase {
    invoker: Arc<ModelInvoker>,
    prompts: Arc<dyn PromptBuilder>,
    plan: Vec<PlannedExchange>,
}

impl CommunicationPhase {
    #[must_use]
    pub fn new(
        invoker: Arc<ModelInvoker>,
        prompts: Arc<dyn PromptBuilder>,
        plan: Vec<PlannedExchange>,
    ) -> Self {
        Self {
            invoker,
            prompts,
            plan,
        }
    }
}

#[async_trait]
impl Phase for CommunicationPhase {
    fn kind(&self) -> PhaseKind {
        PhaseKind::Communication
    }

    async fn execute(
        &self,
        state: ScenarioState,
        cx: &PhaseContext,
    ) -> Result<ScenarioState, PhaseError> {
        let turn = cx.turn;
        let shared = Arc::new(state.clone());

        let mut exchanges: Vec<(PlannedExchange, String)> = Vec::with_capacity(self.plan.len());
        let mut handles: Vec<JoinHandle<Result<InvokeOutcome, ModelCallError>>> =
            Vec::with_capacity(self.plan.len());
        for exchange in &self.plan {
            let Some(sender) = state.actors.get(&exchange.sender) else {
                tracing::warn!(
                    run_id = %cx.run_id,
                    sender = %exchange.sender,
                    "communication plan names an unknown sender; skipping exchange"
                );
                continue;
            };
            let sender = Arc::clone(sender);
            let shared = Arc::clone(&shared);
            let invoker = Arc::clone(&self.invoker);
            let prompts = Arc::clone(&self.prompts);
            let recipients = exchange.recipients.clone();
            let model = sender.model.clone();
            let task_model = model.clone();
            handles.push(tokio::spawn(async move {
                let prompt = prompts.communication_prompt(&shared, &sender, &recipients);
                invoker.invoke(&task_model, &prompt, false).await
            }));
            exchanges.push((exchange.clone(), model));
        }

        // join_all preserves spawn order, so the merge follows plan order.
        let results = join_all(handles).await;

        let mut state = state;
        for ((exchange, model), joined) in exchanges.into_iter().zip(results) {
            let result = match joined {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(join_error) => Err(format!("communication task aborted: {join_error}")),
            };

            match result {
                Ok(outcome) => {
                    if !outcome.cached {
                        let record = cx.ledger.record(
                            Some(&exchange.sender),
                            PhaseKind::Communication,
                            turn,
                            &model,
                            outcome.input_tokens,
                            outcome.output_tokens,
                        )?;
                        cx.emit(EventKind::CostIncurred {
                            actor: Some(exchange.sender.clone()),
                            phase: PhaseKind::Communication,
                            model: model.clone(),
                            cost: record.cost,
                        });
                        state = state.with_cost(record);
                    }
                    state = state.with_communication(Communication {
                        turn,
                        sender: exchange.sender.clone(),
                        recipients: exchange.recipients.clone(),
                        content: outcome.text,
                        kind: exchange.kind,
                        timestamp: Utc::now(),
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        run_id = %cx.run_id,
                        sender = %exchange.sender,
                        turn,
                        %error,
                        "communication exchange failed; continuing without it"
                    );
                    cx.emit(EventKind::ValidationIssue {
                        turn,
                        actor: Some(exchange.sender.clone()),
                        message: format!("communication exchange failed: {error}"),
                    });
                }
            }
        }

        Ok(state)
    }
}
