//! `MockAgent` — a test double for `ExecutableAgent`.
//!
//! Useful in unit and scheduler tests where a real agent implementation is
//! either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use crate::traits::{AgentResult, ExecutionContext};
use crate::{ExecutableAgent, NodeError};

/// Behaviour injected into `MockAgent` at construction time.
pub enum MockBehaviour {
    /// Return a specific JSON value wrapped in a successful `AgentResult`.
    ReturnValue(Value),
    /// Fail `run` with a `Retryable` error.
    FailRetryable(String),
    /// Fail `run` with a `Fatal` error.
    FailFatal(String),
    /// Never return — used to exercise the caller's timeout.
    Hang,
}

/// A mock agent that records every call it receives and returns a
/// programmer-specified result.
pub struct MockAgent {
    /// Label used in test assertions and returned by `name()`.
    pub name: String,
    /// What the agent will do when `run` is called.
    pub behaviour: MockBehaviour,
    /// Whether `validate_input` should return `false`.
    pub reject_input: bool,
    /// All inputs seen by this agent (in call order).
    pub calls: Arc<Mutex<Vec<Value>>>,
}

impl MockAgent {
    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(value),
            reject_input: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailFatal(msg.into()),
            reject_input: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::FailRetryable(msg.into()),
            reject_input: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose `run` never resolves, to exercise node timeouts.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::Hang,
            reject_input: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock whose `validate_input` always returns `false`.
    pub fn rejecting_input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            behaviour: MockBehaviour::ReturnValue(Value::Null),
            reject_input: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times this agent's `run` has been invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutableAgent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate_input(&self, _input_data: &Value) -> bool {
        !self.reject_input
    }

    fn estimate_cost(&self, _input_data: &Value) -> f64 {
        0.0
    }

    async fn run(&self, input: Value, _ctx: &ExecutionContext) -> Result<AgentResult, NodeError> {
        self.calls.lock().unwrap().push(input.clone());

        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => {
                // Merge the incoming value with the agent's own marker field so
                // tests can trace data flowing through the pipeline.
                let mut out = json!({ "node": self.name });
                if let (Some(out_obj), Some(v_obj)) = (out.as_object_mut(), v.as_object()) {
                    for (k, val) in v_obj {
                        out_obj.insert(k.clone(), val.clone());
                    }
                }
                Ok(AgentResult::ok(out))
            }
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
            MockBehaviour::Hang => std::future::pending().await,
        }
    }
}
