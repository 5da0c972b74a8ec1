//! Model invocation seam.
//!
//! The transport that actually talks to a text-generation provider is an
//! external collaborator implementing [`ModelClient`]. This module defines
//! that contract, the classified failure taxonomy, the retry policy for
//! transient failures, and [`ModelInvoker`] — the cache-aware, timeout-
//! bounded wrapper the built-in phases call through.

pub mod invoker;
pub mod retry;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

pub use invoker::{InvokeOutcome, ModelInvoker};
pub use retry::RetryPolicy;

/// Result of one successful model call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelOutput {
    /// Generated text.
    pub text: String,
    /// Prompt tokens consumed.
    pub input_tokens: u64,
    /// Completion tokens produced.
    pub output_tokens: u64,
}

/// Model-invocation collaborator contract.
///
/// `call` either returns the generated text with its token usage or a
/// classified [`ModelCallError`]. Classification drives retry behavior:
/// transient failures are retried with backoff, permanent failures surface
/// immediately.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Invoke `model` with the fully rendered `prompt`.
    async fn call(&self, model: &str, prompt: &str) -> Result<ModelOutput, ModelCallError>;
}

/// Classified model invocation failures.
///
/// Transient: [`RateLimited`](Self::RateLimited), [`Server`](Self::Server),
/// [`Timeout`](Self::Timeout), [`Connection`](Self::Connection).
/// Permanent: [`Auth`](Self::Auth), [`Invalid`](Self::Invalid).
/// [`Malformed`](Self::Malformed) marks output that arrived but could not be
/// interpreted; callers handle it with best-effort fallback extraction, not
/// retries.
#[derive(Clone, Debug, Error, Diagnostic)]
pub enum ModelCallError {
    /// Provider throttled the call; retry after the advertised delay.
    #[error("rate limited (retry_after_ms: {retry_after_ms:?})")]
    #[diagnostic(code(turnloom::model::rate_limited))]
    RateLimited {
        /// Provider-specified retry delay, when present.
        retry_after_ms: Option<u64>,
    },

    /// Provider-side failure (5xx).
    #[error("server error ({status}): {message}")]
    #[diagnostic(code(turnloom::model::server))]
    Server { status: u16, message: String },

    /// The call exceeded its configured timeout.
    #[error("model call timed out after {elapsed_ms}ms")]
    #[diagnostic(
        code(turnloom::model::timeout),
        help("Timeouts are retried; raise the per-call timeout if they persist.")
    )]
    Timeout { elapsed_ms: u64 },

    /// Transport-level failure before a response arrived.
    #[error("connection failure: {0}")]
    #[diagnostic(code(turnloom::model::connection))]
    Connection(String),

    /// Authentication or authorization rejection. Never retried.
    #[error("authentication failure: {0}")]
    #[diagnostic(
        code(turnloom::model::auth),
        help("Check the provider credentials supplied to the model client.")
    )]
    Auth(String),

    /// Any other 4xx-class rejection. Never retried.
    #[error("invalid request ({status}): {message}")]
    #[diagnostic(code(turnloom::model::invalid))]
    Invalid { status: u16, message: String },

    /// The provider answered, but the payload could not be interpreted.
    #[error("malformed model output: {0}")]
    #[diagnostic(code(turnloom::model::malformed))]
    Malformed(String),
}

impl ModelCallError {
    /// Returns true if the failure warrants a backoff retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelCallError::RateLimited { .. }
                | ModelCallError::Server { .. }
                | ModelCallError::Timeout { .. }
                | ModelCallError::Connection(_)
        )
    }
}
