//! The `ExecutableAgent` trait — the contract every agent must fulfil.
//!
//! Three operations, called by the engine in this order:
//! 1. `validate_input`  — pure, synchronous, idempotent.
//! 2. `estimate_cost`   — pure, synchronous, non-negative.
//! 3. `run`              — may perform I/O, bounded by the caller's timeout.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::NodeError;

/// Shared, read-only view of the workflow run passed to every agent invocation.
///
/// Defined here (in the nodes crate) so both the engine and individual agent
/// implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// ID of the parent workflow.
    pub workflow_id: uuid::Uuid,
    /// ID of the current execution run.
    pub execution_id: uuid::Uuid,
    /// Initial input supplied when the execution was triggered.
    pub input: Value,
    /// Decrypted secrets scoped to this workflow.
    pub secrets: HashMap<String, String>,
}

/// The result of a single agent invocation.
///
/// `run` fills in `data` and, on failure, `error_message`. `execution_time_ms`
/// and `cost_estimate` are filled in by the caller (the executor) uniformly
/// across every agent, rather than trusting each agent to time itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AgentResult {
    pub success: bool,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub execution_time_ms: Option<i64>,
    #[serde(default)]
    pub cost_estimate: Option<f64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl AgentResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error_message: None,
            execution_time_ms: None,
            cost_estimate: None,
            metadata: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error_message: Some(message.into()),
            execution_time_ms: None,
            cost_estimate: None,
            metadata: None,
        }
    }
}

/// The core agent trait. All built-in agents and future plugin agents must
/// implement this.
#[async_trait]
pub trait ExecutableAgent: Send + Sync {
    /// Human-readable name, used in logs and the agent registry listing.
    fn name(&self) -> &str;

    /// Validate `input_data` before `run` is ever called.
    ///
    /// Must be pure, idempotent, and side-effect-free. A `false` return fails
    /// the node with `NodeError::InvalidInput` and skips the retry loop.
    fn validate_input(&self, input_data: &Value) -> bool;

    /// Estimate the cost of running this agent with `input_data`.
    ///
    /// Must be pure and non-negative; the same input must always yield the
    /// same estimate.
    fn estimate_cost(&self, input_data: &Value) -> f64;

    /// Execute the agent. May perform I/O and may suspend; must not mutate
    /// `ctx`. The caller enforces the per-node timeout — this method should
    /// be responsive to the timeout racing it, not implement one itself.
    async fn run(&self, input_data: Value, ctx: &ExecutionContext) -> Result<AgentResult, NodeError>;
}

/// Maps `agent_type` strings to registered agent implementations.
///
/// Fixed at construction time; runtime mutation is out of scope (§6).
pub type AgentRegistry = HashMap<String, Arc<dyn ExecutableAgent>>;
