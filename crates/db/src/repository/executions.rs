//! Execution and task-execution repository functions backing `PgJournal`
//! (see [`crate::journal`]).

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::{TaskExecutionRow, WorkflowExecutionRow},
    DbError,
};

/// Insert a new workflow execution record in `running` status. Idempotent:
/// if `execution_id` already has a row, the existing row is returned
/// untouched rather than erroring.
pub async fn create_execution(
    pool: &PgPool,
    execution_id: Uuid,
    workflow_id: Uuid,
) -> Result<WorkflowExecutionRow, DbError> {
    let now = Utc::now();

    let row = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"
        INSERT INTO workflow_executions (id, workflow_id, status, started_at)
        VALUES ($1, $2, 'running', $3)
        ON CONFLICT (id) DO UPDATE SET id = workflow_executions.id
        RETURNING id, workflow_id, status, started_at, finished_at, error_message, output_data
        "#,
    )
    .bind(execution_id)
    .bind(workflow_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Mark a workflow execution as finished. A no-op if it was already marked
/// finished (the first terminal write wins — see [`crate::journal`]).
pub async fn finish_execution(
    pool: &PgPool,
    execution_id: Uuid,
    status: &str,
    error_message: Option<&str>,
    output_data: Option<serde_json::Value>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE workflow_executions
        SET status = $1, finished_at = $2, error_message = $3, output_data = $4
        WHERE id = $5 AND finished_at IS NULL
        "#,
    )
    .bind(status)
    .bind(Utc::now())
    .bind(error_message)
    .bind(output_data)
    .bind(execution_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_execution(pool: &PgPool, execution_id: Uuid) -> Result<Option<WorkflowExecutionRow>, DbError> {
    let row = sqlx::query_as::<_, WorkflowExecutionRow>(
        r#"SELECT id, workflow_id, status, started_at, finished_at, error_message, output_data FROM workflow_executions WHERE id = $1"#,
    )
    .bind(execution_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Insert a new (running) task execution record for `node_id`.
pub async fn begin_task(pool: &PgPool, execution_id: Uuid, node_id: &str) -> Result<(), DbError> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO task_executions (id, execution_id, node_id, status, attempts, started_at)
        VALUES ($1, $2, $3, 'running', 0, $4)
        "#,
    )
    .bind(id)
    .bind(execution_id)
    .bind(node_id)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Mark a task execution as finished. A no-op if it was already finished.
#[allow(clippy::too_many_arguments)]
pub async fn finish_task(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
    status: &str,
    attempts: i32,
    output: Option<serde_json::Value>,
    error_message: Option<&str>,
    execution_time_ms: Option<i64>,
    cost_estimate: Option<f64>,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE task_executions
        SET status = $1, attempts = $2, output = $3, error_message = $4, finished_at = $5,
            execution_time_ms = $6, cost_estimate = $7
        WHERE execution_id = $8 AND node_id = $9 AND finished_at IS NULL
        "#,
    )
    .bind(status)
    .bind(attempts)
    .bind(output)
    .bind(error_message)
    .bind(Utc::now())
    .bind(execution_time_ms)
    .bind(cost_estimate)
    .bind(execution_id)
    .bind(node_id)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_tasks(pool: &PgPool, execution_id: Uuid) -> Result<Vec<TaskExecutionRow>, DbError> {
    let rows = sqlx::query_as::<_, TaskExecutionRow>(
        r#"
        SELECT id, execution_id, node_id, status, attempts, output, error_message,
               execution_time_ms, cost_estimate, started_at, finished_at
        FROM task_executions
        WHERE execution_id = $1
        ORDER BY started_at ASC
        "#,
    )
    .bind(execution_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
