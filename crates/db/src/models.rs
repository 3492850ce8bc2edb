//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (`{ "nodes": [...] }` plus trigger).
    pub definition: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted workflow execution row (mirrors
/// [`engine::journal::WorkflowExecutionRecord`]).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Each completed node's output, keyed by node ID (§4.6). Populated
    /// only once the execution finishes.
    pub output_data: Option<serde_json::Value>,
}

/// A persisted task (node) execution row (mirrors
/// [`engine::journal::TaskExecutionRecord`]).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaskExecutionRow {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: String,
    pub attempts: i32,
    pub output: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<i64>,
    pub cost_estimate: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A persisted secret row, scoped to a workflow.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecretRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub key: String,
    /// AES-256 encrypted value (base64-encoded ciphertext).
    pub encrypted_value: String,
}
