use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::instrument;

use super::retry::RetryPolicy;
use super::{ModelCallError, ModelClient, ModelOutput};
use crate::cache::{CachedResponse, Fingerprint, ResponseCache};
use crate::ledger::PricingTable;

/// Result of one invocation through the [`ModelInvoker`].
///
/// `cached` tells the calling phase whether a ledger entry should be
/// settled for this outcome: cache hits produce no ledger entry, their
/// avoided spend is tracked by the cache statistics instead.
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeOutcome {
    /// Generated (or replayed) text.
    pub text: String,
    /// Prompt tokens of the underlying call.
    pub input_tokens: u64,
    /// Completion tokens of the underlying call.
    pub output_tokens: u64,
    /// Whether the response was served from the cache.
    pub cached: bool,
}

impl InvokeOutcome {
    fn fresh(output: ModelOutput) -> Self {
        Self {
            text: output.text,
            input_tokens: output.input_tokens,
            output_tokens: output.output_tokens,
            cached: false,
        }
    }

    fn replayed(response: CachedResponse) -> Self {
        Self {
            text: response.text,
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
            cached: true,
        }
    }
}

/// Cache-aware, timeout-bounded, retrying wrapper around a [`ModelClient`].
///
/// Invocation order: cache lookup (honoring the bypass flag) → timeout-
/// bounded call with transient-failure retries → cache insert. The invoker
/// deliberately does NOT write the cost ledger: the calling phase settles
/// ledger entries in declared actor order after its fan-in, so concurrent
/// completion jitter never reorders the persisted record list.
pub struct ModelInvoker {
    client: Arc<dyn ModelClient>,
    cache: Arc<ResponseCache>,
    pricing: PricingTable,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ModelInvoker {
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Creates an invoker with the default retry policy and timeout.
    ///
    /// The pricing table is used only to stamp cached entries with the cost
    /// of their original call so hits can be reported as estimated savings;
    /// authoritative pricing stays with the [`CostLedger`](crate::ledger::CostLedger).
    #[must_use]
    pub fn new(
        client: Arc<dyn ModelClient>,
        cache: Arc<ResponseCache>,
        pricing: PricingTable,
    ) -> Self {
        Self {
            client,
            cache,
            pricing,
            retry: RetryPolicy::default(),
            call_timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Invoke `model` with `prompt`, consulting the cache first.
    #[instrument(skip(self, prompt), err)]
    pub async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        bypass_cache: bool,
    ) -> Result<InvokeOutcome, ModelCallError> {
        let fingerprint = Fingerprint::compute(model, prompt);
        if let Some(hit) = self.cache.get(&fingerprint, bypass_cache) {
            tracing::debug!(model, "cache hit");
            return Ok(InvokeOutcome::replayed(hit));
        }

        let output = self.call_with_retry(model, prompt).await?;

        // Savings estimate only; an unpriced model simply records zero here
        // and fails closed later at ledger settlement.
        let unit_cost = self
            .pricing
            .price(model, output.input_tokens, output.output_tokens)
            .unwrap_or(0.0);
        self.cache.put(
            &fingerprint,
            CachedResponse {
                model: model.to_string(),
                text: output.text.clone(),
                input_tokens: output.input_tokens,
                output_tokens: output.output_tokens,
                unit_cost,
            },
        );

        Ok(InvokeOutcome::fresh(output))
    }

    async fn call_with_retry(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<ModelOutput, ModelCallError> {
        let mut attempt: u32 = 0;
        loop {
            let result = match timeout(self.call_timeout, self.client.call(model, prompt)).await {
                Ok(result) => result,
                Err(_) => Err(ModelCallError::Timeout {
                    elapsed_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
                }),
            };

            match result {
                Ok(output) => return Ok(output),
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    let delay = self.retry.delay_for(attempt, &error);
                    tracing::debug!(
                        model,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        ?delay,
                        %error,
                        "transient model failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
