use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use db::repository::workflows as wf_repo;
use engine::Workflow;

use super::AppState;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    pub input: Value,
    #[serde(default)]
    pub secrets: HashMap<String, String>,
}

#[derive(serde::Serialize)]
pub struct ExecutionAccepted {
    pub execution_id: Uuid,
}

/// Look up the workflow, validate its DAG, and launch it — returns as soon
/// as the run is accepted, not when it finishes.
pub async fn execute(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<ExecutionAccepted>), StatusCode> {
    let wf_row = match wf_repo::get_workflow(&state.pool, id).await {
        Ok(row) => row,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };
    let workflow: Workflow =
        serde_json::from_value(wf_row.definition).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let dag_value = serde_json::to_value(&workflow.dag).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let execution_id = state
        .engine
        .execute_workflow(id, &dag_value, payload.input, payload.secrets)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok((StatusCode::ACCEPTED, Json(ExecutionAccepted { execution_id })))
}

pub async fn get_status(
    Path(execution_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<engine::journal::WorkflowExecutionRecord>, StatusCode> {
    match state.engine.get_execution_status(execution_id).await {
        Ok(record) => Ok(Json(record)),
        Err(engine::EngineError::ExecutionNotFound(_)) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn list_tasks(
    Path(execution_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<engine::journal::TaskExecutionRecord>>, StatusCode> {
    match state.engine.list_task_executions(execution_id).await {
        Ok(tasks) => Ok(Json(tasks)),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn cancel(Path(execution_id): Path<Uuid>, State(state): State<AppState>) -> StatusCode {
    match state.engine.cancel_workflow(execution_id).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.engine.list_available_agents())
}
