//! Engine-level error types.

use thiserror::Error;

/// Errors produced by the workflow engine (validation + execution).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Validation errors (§4.1) ------
    /// Top-level DAG definition wasn't a JSON object with a `nodes` array.
    #[error("malformed DAG definition: {0}")]
    MalformedDAG(String),

    /// `nodes` was present but empty.
    #[error("DAG must contain at least one node")]
    EmptyDAG,

    /// A node object was missing `id`, `name`, or `agent_type`.
    #[error("node {index} missing required field '{field}'")]
    MissingField { index: usize, field: &'static str },

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// A node's `dependencies` entry references a node ID that doesn't exist.
    #[error("node '{node_id}' depends on unknown node '{dependency_id}'")]
    DanglingDependency {
        node_id: String,
        dependency_id: String,
    },

    /// A node lists itself as one of its own dependencies.
    #[error("node '{0}' cannot depend on itself")]
    SelfLoop(String),

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CyclicDAG,

    // ------ Execution errors (§7) ------
    /// No agent is registered for the node's `agent_type`.
    #[error("node '{node_id}' references unknown agent type '{agent_type}'")]
    UnknownAgentType { node_id: String, agent_type: String },

    /// The agent's `validate_input` returned `false`.
    #[error("node '{node_id}' rejected by agent input validation: {message}")]
    InvalidAgentInput { node_id: String, message: String },

    /// The agent did not complete within `timeout_seconds`, even after retries.
    #[error("node '{node_id}' timed out after {timeout_seconds}s ({attempts} attempt(s))")]
    AgentTimeout {
        node_id: String,
        timeout_seconds: u64,
        attempts: u32,
    },

    /// The agent returned `success=false` or raised, and retries were exhausted.
    #[error("node '{node_id}' failed after {attempts} attempt(s): {message}")]
    AgentFailure {
        node_id: String,
        message: String,
        attempts: u32,
    },

    /// The node was in flight when the workflow execution was cancelled.
    #[error("node '{0}' cancelled")]
    NodeCancelled(String),

    /// The workflow execution itself was cancelled.
    #[error("workflow execution cancelled")]
    WorkflowCancelled,

    /// An execution with this ID is already running.
    #[error("execution '{0}' is already running")]
    AlreadyRunning(uuid::Uuid),

    /// No execution with this ID is known to the journal.
    #[error("execution '{0}' not found")]
    ExecutionNotFound(uuid::Uuid),

    /// The persistence port (journal) failed.
    #[error("journal error: {0}")]
    Journal(String),
}
