//! Shared types for the cluster orchestration workspace
//!
//! Contains the data matrix, identifiers, error types and the logging
//! conventions used by every crate in the workspace.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
