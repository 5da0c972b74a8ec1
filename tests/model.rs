use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use turnloom::cache::{CacheConfig, ResponseCache};
use turnloom::ledger::PricingTable;
use turnloom::model::{ModelCallError, ModelClient, ModelInvoker, ModelOutput, RetryPolicy};

mod common;

use common::MockModelClient;

fn pricing() -> PricingTable {
    PricingTable::new().with_model("mock-small", 0.5, 1.5)
}

fn invoker(client: Arc<dyn ModelClient>) -> ModelInvoker {
    ModelInvoker::new(
        client,
        Arc::new(ResponseCache::new(CacheConfig::default())),
        pricing(),
    )
}

#[tokio::test]
async fn identical_calls_are_served_from_cache() {
    let client = Arc::new(MockModelClient::new());
    let invoker = invoker(client.clone());

    let first = invoker
        .invoke("mock-small", "same prompt", false)
        .await
        .expect("first call");
    assert!(!first.cached);

    let second = invoker
        .invoke("mock-small", "same prompt", false)
        .await
        .expect("second call");
    assert!(second.cached);
    assert_eq!(second.text, first.text);
    assert_eq!(client.calls(), 1, "only one outbound call was made");
}

#[tokio::test]
async fn bypass_flag_forces_a_fresh_call() {
    let client = Arc::new(MockModelClient::new());
    let invoker = invoker(client.clone());

    invoker
        .invoke("mock-small", "bypass prompt", false)
        .await
        .expect("seed the cache");
    let bypassed = invoker
        .invoke("mock-small", "bypass prompt", true)
        .await
        .expect("bypassed call");

    assert!(!bypassed.cached);
    assert_eq!(client.calls(), 2);
}

/// Fails with a transient error a fixed number of times, then succeeds.
struct FlakyClient {
    failures_remaining: AtomicU64,
    calls: AtomicU64,
}

impl FlakyClient {
    fn new(failures: u64) -> Self {
        Self {
            failures_remaining: AtomicU64::new(failures),
            calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl ModelClient for FlakyClient {
    async fn call(&self, _model: &str, _prompt: &str) -> Result<ModelOutput, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ModelCallError::Server {
                status: 503,
                message: "temporarily unavailable".to_string(),
            });
        }
        Ok(ModelOutput {
            text: "recovered".to_string(),
            input_tokens: 10,
            output_tokens: 5,
        })
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let client = Arc::new(FlakyClient::new(2));
    let invoker = ModelInvoker::new(
        client.clone(),
        Arc::new(ResponseCache::new(CacheConfig::default())),
        pricing(),
    )
    .with_retry_policy(RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    });

    let outcome = invoker
        .invoke("mock-small", "flaky prompt", false)
        .await
        .expect("eventually succeeds");
    assert_eq!(outcome.text, "recovered");
    assert_eq!(client.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn exhausted_retries_surface_the_transient_error() {
    let client = Arc::new(FlakyClient::new(10));
    let invoker = ModelInvoker::new(
        client.clone(),
        Arc::new(ResponseCache::new(CacheConfig::default())),
        pricing(),
    )
    .with_retry_policy(RetryPolicy {
        max_retries: 1,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
    });

    let result = invoker.invoke("mock-small", "doomed prompt", false).await;
    assert!(matches!(result, Err(ModelCallError::Server { status: 503, .. })));
    assert_eq!(client.calls.load(Ordering::SeqCst), 2, "one call plus one retry");
}

/// Permanent failures must not be retried at all.
struct AuthFailClient {
    calls: AtomicU64,
}

#[async_trait]
impl ModelClient for AuthFailClient {
    async fn call(&self, _model: &str, _prompt: &str) -> Result<ModelOutput, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelCallError::Auth("key revoked".to_string()))
    }
}

#[tokio::test]
async fn permanent_failures_surface_immediately() {
    let client = Arc::new(AuthFailClient {
        calls: AtomicU64::new(0),
    });
    let invoker = ModelInvoker::new(
        client.clone(),
        Arc::new(ResponseCache::new(CacheConfig::default())),
        pricing(),
    );

    let result = invoker.invoke("mock-small", "auth prompt", false).await;
    assert!(matches!(result, Err(ModelCallError::Auth(_))));
    assert_eq!(client.calls.load(Ordering::SeqCst), 1);
}

/// Never completes; exercises the per-call timeout.
struct HangingClient;

#[async_trait]
impl ModelClient for HangingClient {
    async fn call(&self, _model: &str, _prompt: &str) -> Result<ModelOutput, ModelCallError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the timeout fires first")
    }
}

#[tokio::test]
async fn hung_calls_time_out_as_retryable_failures() {
    let invoker = ModelInvoker::new(
        Arc::new(HangingClient),
        Arc::new(ResponseCache::new(CacheConfig::default())),
        pricing(),
    )
    .with_timeout(Duration::from_millis(30))
    .with_retry_policy(RetryPolicy::none());

    let result = invoker.invoke("mock-small", "hanging prompt", false).await;
    assert!(matches!(result, Err(ModelCallError::Timeout { .. })));
}
