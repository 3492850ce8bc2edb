use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use db::repository::workflows as wf_repo;
use engine::Workflow;

use super::AppState;

/// Find the workflow whose `Trigger::Webhook { path }` matches `path` and
/// launch it with the request body as input.
pub async fn handle_webhook(
    Path(path): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    let workflows = match wf_repo::list_workflows(&state.pool).await {
        Ok(wfs) => wfs,
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let matched = workflows.into_iter().find_map(|row| {
        let workflow: Workflow = serde_json::from_value(row.definition.clone()).ok()?;
        match &workflow.trigger {
            engine::Trigger::Webhook { path: trigger_path } if trigger_path == &path => Some(workflow),
            _ => None,
        }
    });

    let Some(workflow) = matched else {
        return Err(StatusCode::NOT_FOUND);
    };

    let dag_value = serde_json::to_value(&workflow.dag).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let execution_id = state
        .engine
        .execute_workflow(workflow.id, &dag_value, payload, Default::default())
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "execution_id": execution_id }))))
}
