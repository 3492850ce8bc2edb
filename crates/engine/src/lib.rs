//! `engine` crate — DAG validation, the execution context, the scheduler,
//! and the `Engine` façade that ties them together.
//!
//! This crate defines the [`journal::ExecutionJournal`] persistence port
//! but implements no concrete storage backend; the `db` crate depends on
//! `engine` (not the other way around) to provide `PgJournal`.

pub mod context;
pub mod dag;
pub mod engine;
pub mod error;
pub mod executor;
pub mod journal;
pub mod models;
pub mod scheduler;

pub use dag::{parse_and_validate, validate_dag, DagNode, NodeConditions, NodeStatus, WorkflowDag};
pub use engine::Engine;
pub use error::EngineError;
pub use journal::{ExecutionJournal, InMemoryJournal, TaskStatus, WorkflowStatus};
pub use models::{Trigger, Workflow};
pub use scheduler::{NodeReport, Scheduler, WorkflowOutcome};
