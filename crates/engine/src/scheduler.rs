//! Level-wise DAG scheduler (§4.4): runs each level's nodes concurrently,
//! waits for the whole level to settle, then decides which nodes in the
//! next level are actually eligible before launching it.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use nodes::AgentRegistry;

use crate::context::SharedContext;
use crate::dag::{DagNode, NodeStatus, WorkflowDag};
use crate::executor::TaskExecutor;
use crate::journal::{ExecutionJournal, JournalError, TaskStatus};
use crate::EngineError;

/// Per-node bookkeeping the scheduler mutates as a run progresses. Kept
/// separate from `DagNode` so the DAG definition itself stays immutable and
/// shareable across concurrent node tasks.
#[derive(Debug, Clone)]
struct NodeRuntime {
    status: NodeStatus,
    attempts: u32,
    error_message: Option<String>,
}

/// Final, per-node outcome returned alongside the workflow-level result.
#[derive(Debug, Clone)]
pub struct NodeReport {
    pub node_id: String,
    pub status: NodeStatus,
    pub attempts: u32,
    pub error_message: Option<String>,
}

/// Result of running a whole workflow to completion.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub execution_id: Uuid,
    pub succeeded: bool,
    /// Set when cancellation was observed before every level finished
    /// (§4.4) — distinct from an ordinary failure.
    pub cancelled: bool,
    pub node_reports: Vec<NodeReport>,
    /// Every `Completed` node's output, keyed by node ID (§4.6).
    pub output_data: Value,
}

/// Drives one workflow execution level by level.
pub struct Scheduler {
    registry: Arc<AgentRegistry>,
    journal: Arc<dyn ExecutionJournal>,
}

impl Scheduler {
    pub fn new(registry: Arc<AgentRegistry>, journal: Arc<dyn ExecutionJournal>) -> Self {
        Self { registry, journal }
    }

    /// Run `dag` (already validated, with `levels` from
    /// [`crate::dag::validate_dag`]) to completion.
    ///
    /// `cancel` is observed at the boundary between levels and — best
    /// effort — used to abort in-flight node tasks at their next await
    /// point inside the agent's `run` (§9).
    #[instrument(skip(self, dag, levels, secrets, cancel), fields(%execution_id))]
    pub async fn run_workflow(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
        dag: &WorkflowDag,
        levels: &[Vec<String>],
        input_data: Value,
        secrets: HashMap<String, String>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<WorkflowOutcome, EngineError> {
        let shared = Arc::new(SharedContext::new(workflow_id, execution_id, input_data));
        let executor = Arc::new(TaskExecutor::new(self.registry.clone()));
        let mut runtime: HashMap<String, NodeRuntime> = dag
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeRuntime { status: NodeStatus::Pending, attempts: 0, error_message: None }))
            .collect();

        'levels: for level in levels {
            if *cancel.borrow() {
                break 'levels;
            }

            let mut join_set: JoinSet<(
                String,
                NodeStatus,
                u32,
                Option<Value>,
                Option<String>,
                Option<i64>,
                Option<f64>,
            )> = JoinSet::new();

            for node_id in level {
                let node = dag.node(node_id).expect("level only names declared nodes").clone();

                // A dependency that failed (or is itself still blocked)
                // leaves this node `Pending` forever: it is never launched,
                // never journaled, and never counted toward the failure
                // policy in its own right (§4.4).
                if !dependencies_satisfied(&node, &runtime) {
                    continue;
                }

                if node_should_skip(&node, &shared) {
                    runtime.get_mut(node_id).unwrap().status = NodeStatus::Skipped;
                    self.journal.begin_task(execution_id, node_id).await.map_err(to_engine_err)?;
                    self.journal
                        .end_task(execution_id, node_id, TaskStatus::Skipped, 0, None, None, None, None)
                        .await
                        .map_err(to_engine_err)?;
                    continue;
                }

                runtime.get_mut(node_id).unwrap().status = NodeStatus::Running;
                self.journal.begin_task(execution_id, node_id).await.map_err(to_engine_err)?;

                let executor = executor.clone();
                let shared = shared.clone();
                let secrets = secrets.clone();
                let mut node_cancel = cancel.clone();

                join_set.spawn(async move {
                    let node_id = node.id.clone();
                    tokio::select! {
                        biased;
                        _ = node_cancel.changed() => {
                            (node_id, NodeStatus::Cancelled, 0, None, Some("cancelled".to_string()), None, None)
                        }
                        outcome = executor.execute_node(&node, workflow_id, execution_id, &shared, &secrets) => {
                            match outcome {
                                Ok(o) => (
                                    node_id,
                                    NodeStatus::Completed,
                                    o.attempts,
                                    Some(o.output),
                                    None,
                                    Some(o.execution_time_ms),
                                    Some(o.cost_estimate),
                                ),
                                Err(e) => (node_id, NodeStatus::Failed, 0, None, Some(e.to_string()), None, None),
                            }
                        }
                    }
                });
            }

            while let Some(joined) = join_set.join_next().await {
                let (node_id, status, attempts, output, error_message, execution_time_ms, cost_estimate) =
                    joined.map_err(|e| EngineError::Journal(format!("task panicked: {e}")))?;

                let task_status = match status {
                    NodeStatus::Completed => TaskStatus::Completed,
                    NodeStatus::Cancelled => TaskStatus::Cancelled,
                    _ => TaskStatus::Failed,
                };
                self.journal
                    .end_task(
                        execution_id,
                        &node_id,
                        task_status,
                        attempts,
                        output.clone(),
                        error_message.clone(),
                        execution_time_ms,
                        cost_estimate,
                    )
                    .await
                    .map_err(to_engine_err)?;

                if let Some(rt) = runtime.get_mut(&node_id) {
                    rt.status = status;
                    rt.attempts = attempts;
                    rt.error_message = error_message;
                }
            }
        }

        let node_reports: Vec<NodeReport> = dag
            .nodes
            .iter()
            .map(|n| {
                let rt = runtime.get(&n.id).expect("every node has runtime state");
                NodeReport {
                    node_id: n.id.clone(),
                    status: rt.status,
                    attempts: rt.attempts,
                    error_message: rt.error_message.clone(),
                }
            })
            .collect();

        let cancelled = *cancel.borrow();
        let succeeded = !cancelled && workflow_succeeded(dag, &runtime);
        if cancelled {
            warn!("workflow execution cancelled before all levels completed");
        }
        info!(succeeded, cancelled, "workflow run finished");

        // §4.6: every completed node's output, scanned back out of the
        // shared context rather than threaded separately through `runtime`.
        let mut output_data = serde_json::Map::new();
        for n in &dag.nodes {
            if matches!(runtime[&n.id].status, NodeStatus::Completed) {
                if let Some(output) = shared.get(&format!("node_{}_output", n.id)) {
                    output_data.insert(n.id.clone(), output);
                }
            }
        }

        Ok(WorkflowOutcome {
            execution_id,
            succeeded,
            cancelled,
            node_reports,
            output_data: Value::Object(output_data),
        })
    }
}

/// A node only runs once every dependency has actually reached a terminal
/// non-failed state. Being in an earlier *level* is necessary but not
/// sufficient — a dependency that failed (or is itself blocked) must leave
/// this node `Pending` forever rather than let it run on stale or absent
/// output (§4.4).
fn dependencies_satisfied(node: &DagNode, runtime: &HashMap<String, NodeRuntime>) -> bool {
    node.dependencies.iter().all(|dep_id| {
        matches!(
            runtime.get(dep_id).map(|rt| rt.status),
            Some(NodeStatus::Completed) | Some(NodeStatus::Skipped)
        )
    })
}

/// Evaluate a node's `skip_if` condition against the shared context, if any.
fn node_should_skip(node: &DagNode, shared: &SharedContext) -> bool {
    let Some(conditions) = &node.conditions else {
        return false;
    };
    if conditions.condition_type != "skip_if" {
        return false;
    }
    match shared.get(&conditions.context_key) {
        Some(actual) => actual == conditions.value,
        None => false,
    }
}

/// The workflow as a whole fails iff some node ended `Failed` and was not
/// marked `optional` (§4.4) — nodes left `Pending` by an upstream failure
/// do not themselves count, only the originating `Failed` node does.
fn workflow_succeeded(dag: &WorkflowDag, runtime: &HashMap<String, NodeRuntime>) -> bool {
    !dag.nodes.iter().any(|n| {
        let rt = &runtime[&n.id];
        let optional = n.conditions.as_ref().map(|c| c.optional).unwrap_or(false);
        matches!(rt.status, NodeStatus::Failed) && !optional
    })
}

fn to_engine_err(e: JournalError) -> EngineError {
    EngineError::Journal(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::validate_dag;
    use crate::journal::InMemoryJournal;
    use nodes::identity::IdentityAgent;
    use nodes::mock::MockAgent;
    use serde_json::json;
    use std::collections::HashMap as Map;

    fn node(id: &str, agent_type: &str, deps: &[&str]) -> DagNode {
        DagNode {
            id: id.to_string(),
            name: id.to_string(),
            agent_type: agent_type.to_string(),
            agent_config: Value::Null,
            input_data: json!({}),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            conditions: None,
            max_retries: 1,
            timeout_seconds: 5,
        }
    }

    fn scheduler_with(registry: AgentRegistry) -> (Scheduler, Arc<InMemoryJournal>) {
        let journal = InMemoryJournal::shared();
        (Scheduler::new(Arc::new(registry), journal.clone()), journal)
    }

    #[tokio::test]
    async fn linear_chain_runs_all_nodes_to_completion() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("identity".into(), Arc::new(IdentityAgent));
        let (scheduler, _journal) = scheduler_with(registry);

        let dag = WorkflowDag {
            nodes: vec![
                node("a", "identity", &[]),
                node("b", "identity", &["a"]),
                node("c", "identity", &["b"]),
            ],
        };
        let levels = validate_dag(&dag).unwrap();
        let (_tx, rx) = watch::channel(false);

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert!(!outcome.cancelled);
        assert!(outcome.node_reports.iter().all(|r| matches!(r.status, NodeStatus::Completed)));
        assert!(outcome.output_data.get("a").is_some());
        assert!(outcome.output_data.get("c").is_some());
    }

    #[tokio::test]
    async fn cancellation_marks_outcome_cancelled_and_nodes_cancelled() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("identity".into(), Arc::new(IdentityAgent));
        let (scheduler, _journal) = scheduler_with(registry);

        let dag = WorkflowDag { nodes: vec![node("a", "identity", &[])] };
        let levels = validate_dag(&dag).unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.succeeded);
    }

    #[tokio::test]
    async fn node_cancelled_mid_flight_reports_cancelled_status() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("hang".into(), Arc::new(MockAgent::hanging("hang")));
        let (scheduler, _journal) = scheduler_with(registry);

        let mut n = node("a", "hang", &[]);
        n.timeout_seconds = 60;
        let dag = WorkflowDag { nodes: vec![n] };
        let levels = validate_dag(&dag).unwrap();
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            tx.send(true).unwrap();
        });

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        let a = outcome.node_reports.iter().find(|r| r.node_id == "a").unwrap();
        assert!(matches!(a.status, NodeStatus::Cancelled));
        assert!(outcome.cancelled);
    }

    #[tokio::test]
    async fn dependency_failure_blocks_downstream_node_as_pending() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("identity".into(), Arc::new(IdentityAgent));
        registry.insert("boom".into(), Arc::new(MockAgent::failing_fatal("boom", "nope")));
        let (scheduler, _journal) = scheduler_with(registry);

        let dag = WorkflowDag {
            nodes: vec![node("a", "boom", &[]), node("b", "identity", &["a"])],
        };
        let levels = validate_dag(&dag).unwrap();
        let (_tx, rx) = watch::channel(false);

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        assert!(!outcome.succeeded);
        let b = outcome.node_reports.iter().find(|r| r.node_id == "b").unwrap();
        assert!(matches!(b.status, NodeStatus::Pending));
    }

    #[tokio::test]
    async fn optional_failure_does_not_fail_workflow() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("boom".into(), Arc::new(MockAgent::failing_fatal("boom", "nope")));
        let (scheduler, _journal) = scheduler_with(registry);

        let mut failing_node = node("a", "boom", &[]);
        failing_node.conditions = Some(crate::dag::NodeConditions {
            condition_type: "skip_if".into(),
            context_key: "unused".into(),
            value: Value::Null,
            optional: true,
        });
        let dag = WorkflowDag { nodes: vec![failing_node] };
        let levels = validate_dag(&dag).unwrap();
        let (_tx, rx) = watch::channel(false);

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        assert!(outcome.succeeded);
    }

    #[tokio::test]
    async fn diamond_completes_all_four_nodes() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("identity".into(), Arc::new(IdentityAgent));
        let (scheduler, _journal) = scheduler_with(registry);

        let dag = WorkflowDag {
            nodes: vec![
                node("a", "identity", &[]),
                node("b", "identity", &["a"]),
                node("c", "identity", &["a"]),
                node("d", "identity", &["b", "c"]),
            ],
        };
        let levels = validate_dag(&dag).unwrap();
        let (_tx, rx) = watch::channel(false);

        let outcome = scheduler
            .run_workflow(Uuid::new_v4(), Uuid::new_v4(), &dag, &levels, json!({}), Map::new(), rx)
            .await
            .unwrap();

        assert!(outcome.succeeded);
        assert_eq!(outcome.node_reports.len(), 4);
    }
}
