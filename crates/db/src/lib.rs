//! `db` crate — pure persistence layer.
//!
//! Provides a connection pool, typed row structs, repository functions for
//! every table in the schema, and `PgJournal`, the Postgres implementation
//! of `engine`'s `ExecutionJournal` port. No business logic lives here.

pub mod error;
pub mod journal;
pub mod models;
pub mod pool;
pub mod repository;

pub use error::DbError;
pub use journal::PgJournal;
pub use pool::DbPool;
