//! `api` crate — HTTP REST API layer.
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/executions/:id/tasks
//!   POST   /api/v1/executions/:id/cancel
//!   GET    /api/v1/agents
//!   POST   /webhook/:path
//!
//! There is no job-queue layer between this API and the engine: `execute`
//! and the webhook handler call `Engine::execute_workflow` directly, which
//! validates the DAG synchronously and then runs it as a spawned task.

pub mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use db::DbPool;
use engine::Engine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: Engine,
}

pub async fn serve(bind: &str, pool: DbPool, engine: Engine) -> Result<(), std::io::Error> {
    let state = AppState { pool, engine };

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/workflows/:id", get(handlers::workflows::get).delete(handlers::workflows::delete))
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/executions/:id", get(handlers::executions::get_status))
        .route("/executions/:id/tasks", get(handlers::executions::list_tasks))
        .route("/executions/:id/cancel", post(handlers::executions::cancel))
        .route("/agents", get(handlers::executions::list_agents));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:path", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
