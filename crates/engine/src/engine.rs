//! `Engine` — the public entry point for running and managing workflow
//! executions (§4.4, §9).
//!
//! Each engine instance owns its own `execution_id → RunHandle` map rather
//! than reaching for a process-wide singleton, so a process can host more
//! than one engine (for example, one per tenant) without any of them
//! stepping on each other's cancellation tokens.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tracing::instrument;
use uuid::Uuid;

use nodes::AgentRegistry;

use crate::dag::{parse_and_validate, WorkflowDag};
use crate::journal::{ExecutionJournal, WorkflowStatus};
use crate::scheduler::{Scheduler, WorkflowOutcome};
use crate::EngineError;

/// Handle to a workflow run that may still be in flight.
struct RunHandle {
    cancel_tx: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// Runs workflows and tracks their in-flight executions.
///
/// Cheaply cloneable: internally `Arc`-backed, so the same `Engine` can be
/// shared across the API's Axum handlers and the CLI without extra
/// wrapping.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<AgentRegistry>,
    journal: Arc<dyn ExecutionJournal>,
    runs: Arc<DashMap<Uuid, RunHandle>>,
}

impl Engine {
    pub fn new(registry: AgentRegistry, journal: Arc<dyn ExecutionJournal>) -> Self {
        Self { registry: Arc::new(registry), journal, runs: Arc::new(DashMap::new()) }
    }

    /// Names of every agent type registered with this engine.
    pub fn list_available_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.keys().cloned().collect();
        names.sort();
        names
    }

    /// Validate `dag_definition` and, if it's sound, launch it as a new
    /// execution. Returns as soon as the run is accepted and recorded in
    /// the journal — it does not wait for the workflow to finish.
    ///
    /// # Errors
    /// Any [`EngineError`] variant in the "Validation errors" family if
    /// `dag_definition` is malformed, plus [`EngineError::AlreadyRunning`]
    /// if `execution_id` collides with a run still in flight (vanishingly
    /// unlikely with freshly generated UUIDs, but checked anyway since
    /// nothing else guards uniqueness).
    #[instrument(skip(self, dag_definition, secrets))]
    pub async fn execute_workflow(
        &self,
        workflow_id: Uuid,
        dag_definition: &Value,
        input_data: Value,
        secrets: HashMap<String, String>,
    ) -> Result<Uuid, EngineError> {
        let (dag, levels) = parse_and_validate(dag_definition)?;
        let execution_id = Uuid::new_v4();
        self.spawn_run(workflow_id, execution_id, dag, levels, input_data, secrets).await?;
        Ok(execution_id)
    }

    /// Like [`Self::execute_workflow`] but blocks until the run finishes,
    /// returning its outcome directly. Used by the CLI's `run` subcommand,
    /// where there is no separate status-polling client.
    pub async fn execute_workflow_and_wait(
        &self,
        workflow_id: Uuid,
        dag_definition: &Value,
        input_data: Value,
        secrets: HashMap<String, String>,
    ) -> Result<WorkflowOutcome, EngineError> {
        let (dag, levels) = parse_and_validate(dag_definition)?;
        let execution_id = Uuid::new_v4();
        self.journal.begin_workflow(workflow_id, execution_id).await.map_err(|e| EngineError::Journal(e.to_string()))?;

        let scheduler = Scheduler::new(self.registry.clone(), self.journal.clone());
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = scheduler
            .run_workflow(workflow_id, execution_id, &dag, &levels, input_data, secrets, cancel_rx)
            .await?;

        let status = if outcome.cancelled {
            WorkflowStatus::Cancelled
        } else if outcome.succeeded {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
        self.journal
            .end_workflow(execution_id, status, None, Some(outcome.output_data.clone()))
            .await
            .map_err(|e| EngineError::Journal(e.to_string()))?;

        Ok(outcome)
    }

    async fn spawn_run(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
        dag: WorkflowDag,
        levels: Vec<Vec<String>>,
        input_data: Value,
        secrets: HashMap<String, String>,
    ) -> Result<(), EngineError> {
        if self.runs.contains_key(&execution_id) {
            return Err(EngineError::AlreadyRunning(execution_id));
        }

        self.journal.begin_workflow(workflow_id, execution_id).await.map_err(|e| EngineError::Journal(e.to_string()))?;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let registry = self.registry.clone();
        let journal = self.journal.clone();
        let runs = self.runs.clone();

        let task = tokio::spawn(async move {
            let scheduler = Scheduler::new(registry, journal.clone());
            let result = scheduler
                .run_workflow(workflow_id, execution_id, &dag, &levels, input_data, secrets, cancel_rx)
                .await;

            let (status, error_message, output_data) = match &result {
                Ok(outcome) if outcome.cancelled => {
                    (WorkflowStatus::Cancelled, None, Some(outcome.output_data.clone()))
                }
                Ok(outcome) if outcome.succeeded => {
                    (WorkflowStatus::Completed, None, Some(outcome.output_data.clone()))
                }
                Ok(outcome) => (
                    WorkflowStatus::Failed,
                    Some("one or more required nodes failed".to_string()),
                    Some(outcome.output_data.clone()),
                ),
                Err(e) => (WorkflowStatus::Failed, Some(e.to_string()), None),
            };
            let _ = journal.end_workflow(execution_id, status, error_message, output_data).await;
            runs.remove(&execution_id);
        });

        self.runs.insert(execution_id, RunHandle { cancel_tx, task });
        Ok(())
    }

    /// Signal cancellation for an in-flight execution. A no-op (returns
    /// `Ok`) if the execution already finished — cancelling a finished run
    /// is not an error, it's just too late (§9).
    pub async fn cancel_workflow(&self, execution_id: Uuid) -> Result<(), EngineError> {
        if let Some(handle) = self.runs.get(&execution_id) {
            let _ = handle.cancel_tx.send(true);
        }
        Ok(())
    }

    /// Current status of a (possibly finished) execution, as recorded in
    /// the journal.
    pub async fn get_execution_status(
        &self,
        execution_id: Uuid,
    ) -> Result<crate::journal::WorkflowExecutionRecord, EngineError> {
        self.journal
            .get_workflow_execution(execution_id)
            .await
            .map_err(|e| EngineError::Journal(e.to_string()))?
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Per-node execution history for a workflow run.
    pub async fn list_task_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<crate::journal::TaskExecutionRecord>, EngineError> {
        self.journal
            .list_task_executions(execution_id)
            .await
            .map_err(|e| EngineError::Journal(e.to_string()))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Only the last clone tears anything down; Arc-backed fields mean
        // every other clone sees a no-op here.
        if Arc::strong_count(&self.runs) == 1 {
            for entry in self.runs.iter() {
                entry.task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::InMemoryJournal;
    use nodes::identity::IdentityAgent;
    use serde_json::json;
    use std::collections::HashMap as Map;
    use tokio::time::{sleep, Duration};

    fn engine_with_identity() -> Engine {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("identity".into(), Arc::new(IdentityAgent));
        Engine::new(registry, InMemoryJournal::shared())
    }

    #[tokio::test]
    async fn execute_workflow_runs_to_completion() {
        let engine = engine_with_identity();
        let dag = json!({
            "nodes": [
                { "id": "a", "name": "A", "agent_type": "identity" }
            ]
        });
        let outcome = engine
            .execute_workflow_and_wait(Uuid::new_v4(), &dag, json!({}), Map::new())
            .await
            .unwrap();
        assert!(outcome.succeeded);
    }

    #[tokio::test]
    async fn execute_workflow_rejects_malformed_dag() {
        let engine = engine_with_identity();
        let dag = json!({ "nodes": [] });
        let result = engine.execute_workflow(Uuid::new_v4(), &dag, json!({}), Map::new()).await;
        assert!(matches!(result, Err(EngineError::EmptyDAG)));
    }

    #[tokio::test]
    async fn cancel_unknown_execution_is_not_an_error() {
        let engine = engine_with_identity();
        assert!(engine.cancel_workflow(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn list_available_agents_is_sorted() {
        let engine = engine_with_identity();
        assert_eq!(engine.list_available_agents(), vec!["identity".to_string()]);
    }

    #[tokio::test]
    async fn spawned_execution_eventually_completes() {
        let engine = engine_with_identity();
        let dag = json!({
            "nodes": [{ "id": "a", "name": "A", "agent_type": "identity" }]
        });
        let execution_id = engine.execute_workflow(Uuid::new_v4(), &dag, json!({}), Map::new()).await.unwrap();

        let mut status = None;
        for _ in 0..50 {
            let record = engine.get_execution_status(execution_id).await.unwrap();
            if record.finished_at.is_some() {
                status = Some(record.status);
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(WorkflowStatus::Completed));
    }

    #[tokio::test]
    async fn execute_workflow_and_wait_reports_output_data() {
        let engine = engine_with_identity();
        let dag = json!({
            "nodes": [{ "id": "a", "name": "A", "agent_type": "identity" }]
        });
        let outcome = engine
            .execute_workflow_and_wait(Uuid::new_v4(), &dag, json!({"x": 1}), Map::new())
            .await
            .unwrap();

        let record = engine.get_execution_status(outcome.execution_id).await.unwrap();
        assert_eq!(record.status, WorkflowStatus::Completed);
        assert!(record.output_data.as_ref().and_then(|o| o.get("a")).is_some());
    }

    #[tokio::test]
    async fn cancelling_a_spawned_execution_marks_it_cancelled() {
        let mut registry: AgentRegistry = Map::new();
        registry.insert("hang".into(), Arc::new(nodes::mock::MockAgent::hanging("hang")));
        let engine = Engine::new(registry, InMemoryJournal::shared());

        let dag = json!({
            "nodes": [{ "id": "a", "name": "A", "agent_type": "hang", "timeout_seconds": 60 }]
        });
        let execution_id = engine.execute_workflow(Uuid::new_v4(), &dag, json!({}), Map::new()).await.unwrap();
        engine.cancel_workflow(execution_id).await.unwrap();

        let mut status = None;
        for _ in 0..50 {
            let record = engine.get_execution_status(execution_id).await.unwrap();
            if record.finished_at.is_some() {
                status = Some(record.status);
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(WorkflowStatus::Cancelled));
    }
}
