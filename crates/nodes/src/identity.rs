//! `IdentityAgent` — the simplest possible real agent: echoes its input.
//!
//! Used by the scheduler's own tests and doctests to exercise the linear-chain
//! and diamond scenarios without depending on `mock`'s call-recording overhead.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::traits::{AgentResult, ExecutionContext};
use crate::{ExecutableAgent, NodeError};

/// An agent that always succeeds, returning `{"echo": input}`.
#[derive(Debug, Default)]
pub struct IdentityAgent;

#[async_trait]
impl ExecutableAgent for IdentityAgent {
    fn name(&self) -> &str {
        "identity"
    }

    fn validate_input(&self, _input_data: &Value) -> bool {
        true
    }

    fn estimate_cost(&self, _input_data: &Value) -> f64 {
        0.0
    }

    async fn run(&self, input: Value, _ctx: &ExecutionContext) -> Result<AgentResult, NodeError> {
        Ok(AgentResult::ok(json!({ "echo": input })))
    }
}
