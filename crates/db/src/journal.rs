//! `PgJournal` — the Postgres-backed implementation of
//! `engine::journal::ExecutionJournal`. This is the one place the `db`
//! crate depends on `engine` rather than the other way around: the trait
//! lives with its caller, the implementation lives with the storage
//! technology that satisfies it.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use engine::journal::{
    ExecutionJournal, JournalError, TaskExecutionRecord, TaskStatus, WorkflowExecutionRecord,
    WorkflowStatus,
};

use crate::repository::executions;

pub struct PgJournal {
    pool: PgPool,
}

impl PgJournal {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_journal_err(e: crate::DbError) -> JournalError {
    JournalError::Backend(e.to_string())
}

fn workflow_status_str(status: WorkflowStatus) -> &'static str {
    match status {
        WorkflowStatus::Running => "running",
        WorkflowStatus::Completed => "completed",
        WorkflowStatus::Failed => "failed",
        WorkflowStatus::Cancelled => "cancelled",
    }
}

fn parse_workflow_status(s: &str) -> WorkflowStatus {
    match s {
        "completed" => WorkflowStatus::Completed,
        "failed" => WorkflowStatus::Failed,
        "cancelled" => WorkflowStatus::Cancelled,
        _ => WorkflowStatus::Running,
    }
}

fn task_status_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Skipped => "skipped",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn parse_task_status(s: &str) -> TaskStatus {
    match s {
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "skipped" => TaskStatus::Skipped,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Running,
    }
}

#[async_trait]
impl ExecutionJournal for PgJournal {
    async fn begin_workflow(&self, workflow_id: Uuid, execution_id: Uuid) -> Result<(), JournalError> {
        executions::create_execution(&self.pool, execution_id, workflow_id)
            .await
            .map(|_| ())
            .map_err(to_journal_err)
    }

    async fn end_workflow(
        &self,
        execution_id: Uuid,
        status: WorkflowStatus,
        error_message: Option<String>,
        output_data: Option<serde_json::Value>,
    ) -> Result<(), JournalError> {
        executions::finish_execution(
            &self.pool,
            execution_id,
            workflow_status_str(status),
            error_message.as_deref(),
            output_data,
        )
        .await
        .map_err(to_journal_err)
    }

    async fn begin_task(&self, execution_id: Uuid, node_id: &str) -> Result<(), JournalError> {
        executions::begin_task(&self.pool, execution_id, node_id).await.map_err(to_journal_err)
    }

    async fn end_task(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: TaskStatus,
        attempts: u32,
        output: Option<serde_json::Value>,
        error_message: Option<String>,
        execution_time_ms: Option<i64>,
        cost_estimate: Option<f64>,
    ) -> Result<(), JournalError> {
        executions::finish_task(
            &self.pool,
            execution_id,
            node_id,
            task_status_str(status),
            attempts as i32,
            output,
            error_message.as_deref(),
            execution_time_ms,
            cost_estimate,
        )
        .await
        .map_err(to_journal_err)
    }

    async fn get_workflow_execution(
        &self,
        execution_id: Uuid,
    ) -> Result<Option<WorkflowExecutionRecord>, JournalError> {
        let row = executions::get_execution(&self.pool, execution_id).await.map_err(to_journal_err)?;
        Ok(row.map(|r| WorkflowExecutionRecord {
            execution_id: r.id,
            workflow_id: r.workflow_id,
            status: parse_workflow_status(&r.status),
            started_at: r.started_at,
            finished_at: r.finished_at,
            error_message: r.error_message,
            output_data: r.output_data,
        }))
    }

    async fn list_task_executions(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<TaskExecutionRecord>, JournalError> {
        let rows = executions::list_tasks(&self.pool, execution_id).await.map_err(to_journal_err)?;
        Ok(rows
            .into_iter()
            .map(|r| TaskExecutionRecord {
                execution_id: r.execution_id,
                node_id: r.node_id,
                status: parse_task_status(&r.status),
                attempts: r.attempts as u32,
                started_at: r.started_at,
                finished_at: r.finished_at,
                output: r.output,
                error_message: r.error_message,
                execution_time_ms: r.execution_time_ms,
                cost_estimate: r.cost_estimate,
            })
            .collect())
    }
}
