//! Node-level error type.

use thiserror::Error;

/// Errors returned by an agent's `validate_input`/`estimate_cost`/`run` methods.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable` / `Timeout` — the attempt is re-tried up to the node's `max_retries`.
/// - `InvalidInput`, `Fatal`, `Cancelled` — no retry, the node fails immediately.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// Transient failure; the engine should re-try the attempt.
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(String),

    /// `run` did not complete within the node's `timeout_seconds`.
    #[error("node execution timed out after {0}s")]
    Timeout(u64),

    /// `validate_input` returned `false`.
    #[error("invalid agent input: {0}")]
    InvalidInput(String),

    /// The workflow execution was cancelled while this node was in flight.
    #[error("node execution cancelled")]
    Cancelled,
}
