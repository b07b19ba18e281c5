//! # Bench Common
//!
//! Common types and errors shared across the benchmark workspace.
//!
//! This crate provides the foundational abstractions that the process
//! primitives and the orchestrator build upon: the error taxonomy used to
//! abort a run and a couple of small protocol-level types.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{BenchError, ErrorKind, ProcessError, ProcessResult, Result, ResultExt};
pub use types::{HttpVersion, Scheme};
