//! `nodes` crate — the `ExecutableAgent` trait and built-in agent implementations.
//!
//! Every agent — built-in and plugin alike — must implement [`ExecutableAgent`].
//! The engine crate dispatches execution through this trait object via an
//! [`AgentRegistry`](traits::AgentRegistry).

pub mod error;
pub mod identity;
pub mod mock;
pub mod traits;

pub use error::NodeError;
pub use traits::{AgentRegistry, AgentResult, ExecutableAgent, ExecutionContext};
