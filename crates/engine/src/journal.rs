//! The persistence port (§4.6): a trait the engine calls to durably record
//! workflow and task execution history, with an in-memory implementation
//! for tests. The real implementation (`PgJournal`, backed by `sqlx`) lives
//! in the `db` crate, which depends on `engine` to implement this trait —
//! the engine itself has no knowledge of any concrete storage technology.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionRecord {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Every completed node's output, keyed by node ID (§4.6). `None`
    /// until the workflow finishes.
    pub output_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskExecutionRecord {
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub cost_estimate: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable record of workflow and task execution history.
///
/// Terminal writes (`end_workflow`, `end_task`) must be idempotent: calling
/// either twice for the same `(execution_id[, node_id])` with the same
/// terminal status is a no-op, not an error, since the scheduler may retry
/// a journal write after a transient failure without knowing whether the
/// first attempt actually landed.
#[async_trait]
pub trait ExecutionJournal: Send + Sync {
    async fn begin_workflow(&self, workflow_id: Uuid, execution_id: Uuid) -> Result<(), JournalError>;

    async fn end_workflow(
        &self,
        execution_id: Uuid,
        status: WorkflowStatus,
        error_message: Option<String>,
        output_data: Option<Value>,
    ) -> Result<(), JournalError>;

    async fn begin_task(&self, execution_id: Uuid, node_id: &str) -> Result<(), JournalError>;

    #[allow(clippy::too_many_arguments)]
    async fn end_task(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: TaskStatus,
        attempts: u32,
        output: Option<Value>,
        error_message: Option<String>,
        execution_time_ms: Option<i64>,
        cost_estimate: Option<f64>,
    ) -> Result<(), JournalError>;

    async fn get_workflow_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecutionRecord>, JournalError>;

    async fn list_task_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<TaskExecutionRecord>, JournalError>;
}

/// `DashMap`-backed journal used by scheduler tests and the CLI's `Run`
/// subcommand, where no database is available or desired.
#[derive(Debug, Default)]
pub struct InMemoryJournal {
    workflows: DashMap<Uuid, WorkflowExecutionRecord>,
    tasks: DashMap<Uuid, HashMap<String, TaskExecutionRecord>>,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ExecutionJournal for InMemoryJournal {
    async fn begin_workflow(&self, workflow_id: Uuid, execution_id: Uuid) -> Result<(), JournalError> {
        self.workflows.entry(execution_id).or_insert_with(|| WorkflowExecutionRecord {
            execution_id,
            workflow_id,
            status: WorkflowStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            error_message: None,
            output_data: None,
        });
        Ok(())
    }

    async fn end_workflow(
        &self,
        execution_id: Uuid,
        status: WorkflowStatus,
        error_message: Option<String>,
        output_data: Option<Value>,
    ) -> Result<(), JournalError> {
        if let Some(mut record) = self.workflows.get_mut(&execution_id) {
            if record.finished_at.is_some() {
                return Ok(());
            }
            record.status = status;
            record.finished_at = Some(Utc::now());
            record.error_message = error_message;
            record.output_data = output_data;
        }
        Ok(())
    }

    async fn begin_task(&self, execution_id: Uuid, node_id: &str) -> Result<(), JournalError> {
        self.tasks.entry(execution_id).or_default().entry(node_id.to_string()).or_insert_with(|| {
            TaskExecutionRecord {
                execution_id,
                node_id: node_id.to_string(),
                status: TaskStatus::Running,
                attempts: 0,
                started_at: Utc::now(),
                finished_at: None,
                output: None,
                error_message: None,
                execution_time_ms: None,
                cost_estimate: None,
            }
        });
        Ok(())
    }

    async fn end_task(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: TaskStatus,
        attempts: u32,
        output: Option<Value>,
        error_message: Option<String>,
        execution_time_ms: Option<i64>,
        cost_estimate: Option<f64>,
    ) -> Result<(), JournalError> {
        let mut tasks_for_execution = self.tasks.entry(execution_id).or_default();
        let record = tasks_for_execution.entry(node_id.to_string()).or_insert_with(|| TaskExecutionRecord {
            execution_id,
            node_id: node_id.to_string(),
            status: TaskStatus::Running,
            attempts: 0,
            started_at: Utc::now(),
            finished_at: None,
            output: None,
            error_message: None,
            execution_time_ms: None,
            cost_estimate: None,
        });
        if record.finished_at.is_some() {
            return Ok(());
        }
        record.status = status;
        record.attempts = attempts;
        record.finished_at = Some(Utc::now());
        record.output = output;
        record.error_message = error_message;
        record.execution_time_ms = execution_time_ms;
        record.cost_estimate = cost_estimate;
        Ok(())
    }

    async fn get_workflow_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecutionRecord>, JournalError> {
        Ok(self.workflows.get(&execution_id).map(|r| r.clone()))
    }

    async fn list_task_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<TaskExecutionRecord>, JournalError> {
        Ok(self
            .tasks
            .get(&execution_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn end_workflow_is_idempotent() {
        let journal = InMemoryJournal::new();
        let execution_id = Uuid::new_v4();
        journal.begin_workflow(Uuid::new_v4(), execution_id).await.unwrap();
        journal.end_workflow(execution_id, WorkflowStatus::Completed, None, Some(json!({"a": 1}))).await.unwrap();
        let first = journal.get_workflow_execution(execution_id).await.unwrap().unwrap();
        journal
            .end_workflow(execution_id, WorkflowStatus::Failed, Some("too late".into()), None)
            .await
            .unwrap();
        let second = journal.get_workflow_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(second.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn task_executions_are_scoped_per_execution_id() {
        let journal = InMemoryJournal::new();
        let execution_id = Uuid::new_v4();
        journal.begin_task(execution_id, "a").await.unwrap();
        journal
            .end_task(execution_id, "a", TaskStatus::Completed, 1, Some(Value::Null), None, Some(5), Some(0.0))
            .await
            .unwrap();
        let tasks = journal.list_task_executions(execution_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].node_id, "a");
    }
}
