//! Single-node execution: `TaskExecutor` runs exactly one node of a DAG to
//! completion, handling input preparation, validation, timeout, and retry
//! (§4.3, §4.5). The scheduler drives this per node per level; it holds no
//! notion of "the next node" itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{instrument, warn};

use nodes::{AgentRegistry, AgentResult, ExecutableAgent, ExecutionContext, NodeError};

use crate::context::{inject_dependency_outputs, resolve_templates, SharedContext};
use crate::dag::DagNode;
use crate::EngineError;

/// Outcome of running one node to its terminal state.
#[derive(Debug, Clone)]
pub struct NodeOutcome {
    pub output: Value,
    pub attempts: u32,
    pub execution_time_ms: i64,
    pub cost_estimate: f64,
}

/// Looks up and runs agents on behalf of the scheduler.
pub struct TaskExecutor {
    registry: Arc<AgentRegistry>,
}

impl TaskExecutor {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self { registry }
    }

    /// Execute `node` to completion: prepare its input (dependency
    /// injection + template resolution), validate it against the agent,
    /// then run the agent under a timeout with an explicit, non-recursive
    /// retry loop bounded to `max_retries + 1` total attempts and no
    /// backoff between attempts.
    #[instrument(skip(self, node, shared, secrets), fields(node_id = %node.id, agent_type = %node.agent_type))]
    pub async fn execute_node(
        &self,
        node: &DagNode,
        workflow_id: uuid::Uuid,
        execution_id: uuid::Uuid,
        shared: &SharedContext,
        secrets: &std::collections::HashMap<String, String>,
    ) -> Result<NodeOutcome, EngineError> {
        let agent = self.registry.get(&node.agent_type).ok_or_else(|| EngineError::UnknownAgentType {
            node_id: node.id.clone(),
            agent_type: node.agent_type.clone(),
        })?;

        let with_dependencies = inject_dependency_outputs(&node.input_data, &node.dependencies, shared);
        let snapshot = shared.snapshot();
        let resolved_input = resolve_templates(&with_dependencies, &snapshot);

        if !agent.validate_input(&resolved_input) {
            return Err(EngineError::InvalidAgentInput {
                node_id: node.id.clone(),
                message: "agent rejected node input".to_string(),
            });
        }

        let ctx = ExecutionContext {
            workflow_id,
            execution_id,
            input: resolved_input.clone(),
            secrets: secrets.clone(),
        };

        // §4.3: both are pure/synchronous and run before `run` ever does.
        let cost_estimate = agent.estimate_cost(&resolved_input);

        let max_attempts = node.max_retries + 1;
        let mut attempts = 0u32;
        let started = Instant::now();

        loop {
            attempts += 1;
            let attempt_result = tokio::time::timeout(
                Duration::from_secs(node.timeout_seconds),
                agent.run(resolved_input.clone(), &ctx),
            )
            .await;

            match attempt_result {
                Err(_elapsed) => {
                    if attempts >= max_attempts {
                        return Err(EngineError::AgentTimeout {
                            node_id: node.id.clone(),
                            timeout_seconds: node.timeout_seconds,
                            attempts,
                        });
                    }
                    warn!(attempts, "node timed out, retrying immediately");
                }
                Ok(Err(NodeError::Fatal(msg))) => {
                    return Err(EngineError::AgentFailure { node_id: node.id.clone(), message: msg, attempts });
                }
                Ok(Err(NodeError::InvalidInput(msg))) => {
                    return Err(EngineError::InvalidAgentInput { node_id: node.id.clone(), message: msg });
                }
                Ok(Err(NodeError::Cancelled)) => {
                    return Err(EngineError::NodeCancelled(node.id.clone()));
                }
                Ok(Err(NodeError::Timeout(_))) | Ok(Err(NodeError::Retryable(_))) => {
                    let msg = match attempt_result {
                        Ok(Err(e)) => e.to_string(),
                        _ => unreachable!(),
                    };
                    if attempts >= max_attempts {
                        return Err(EngineError::AgentFailure { node_id: node.id.clone(), message: msg, attempts });
                    }
                    warn!(attempts, %msg, "node failed retryably, retrying immediately");
                }
                Ok(Ok(AgentResult { success: false, error_message, .. })) => {
                    let msg = error_message.unwrap_or_else(|| "agent reported failure".to_string());
                    if attempts >= max_attempts {
                        return Err(EngineError::AgentFailure { node_id: node.id.clone(), message: msg, attempts });
                    }
                    warn!(attempts, %msg, "agent reported failure, retrying immediately");
                }
                Ok(Ok(result)) => {
                    let execution_time_ms = started.elapsed().as_millis() as i64;
                    let metadata = result.metadata.clone().unwrap_or(Value::Null);
                    shared.publish_node_output(&node.id, result.data.clone(), metadata);
                    return Ok(NodeOutcome {
                        output: result.data,
                        attempts,
                        execution_time_ms,
                        cost_estimate,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::mock::MockAgent;
    use std::collections::HashMap as Map;
    use std::sync::Arc;

    fn registry_with(agent: MockAgent) -> Arc<AgentRegistry> {
        let mut map: AgentRegistry = Map::new();
        map.insert(agent.name.clone(), Arc::new(agent));
        Arc::new(map)
    }

    fn node(id: &str, agent_type: &str) -> DagNode {
        DagNode {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: agent_type.to_string(),
            agent_config: Value::Null,
            input_data: serde_json::json!({}),
            dependencies: vec![],
            conditions: None,
            max_retries: 1,
            timeout_seconds: 1,
        }
    }

    #[tokio::test]
    async fn unknown_agent_type_is_rejected() {
        let exec = TaskExecutor::new(Arc::new(Map::new()));
        let n = node("a", "ghost");
        let shared = SharedContext::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Value::Null);
        let result = exec.execute_node(&n, uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), &shared, &Map::new()).await;
        assert!(matches!(result, Err(EngineError::UnknownAgentType { .. })));
    }

    #[tokio::test]
    async fn retryable_failure_exhausts_after_max_retries_plus_one_attempts() {
        let agent = MockAgent::failing_retryable("ghost", "nope");
        let registry = registry_with(agent);
        let exec = TaskExecutor::new(registry);
        let mut n = node("a", "ghost");
        n.max_retries = 2;
        let shared = SharedContext::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Value::Null);
        let result = exec.execute_node(&n, uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), &shared, &Map::new()).await;
        assert!(matches!(result, Err(EngineError::AgentFailure { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn timeout_surfaces_as_agent_timeout() {
        let agent = MockAgent::hanging("ghost");
        let registry = registry_with(agent);
        let exec = TaskExecutor::new(registry);
        let mut n = node("a", "ghost");
        n.max_retries = 0;
        n.timeout_seconds = 0;
        let shared = SharedContext::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Value::Null);
        let result = exec.execute_node(&n, uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), &shared, &Map::new()).await;
        assert!(matches!(result, Err(EngineError::AgentTimeout { .. })));
    }

    #[tokio::test]
    async fn success_publishes_output_to_shared_context() {
        let agent = MockAgent::returning("ghost", serde_json::json!({"v": 1}));
        let registry = registry_with(agent);
        let exec = TaskExecutor::new(registry);
        let n = node("a", "ghost");
        let shared = SharedContext::new(uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), Value::Null);
        let result = exec.execute_node(&n, uuid::Uuid::new_v4(), uuid::Uuid::new_v4(), &shared, &Map::new()).await.unwrap();
        assert_eq!(result.attempts, 1);
        assert!(shared.get("dependency_a").is_some());
    }
}
