//! # Bench Process
//!
//! Low-level process operations used by the server supervisor and the load
//! invoker.
//!
//! This crate provides primitives for:
//! - Process spawning
//! - Graceful termination
//! - Process existence checks
//! - Executable and directory validation

pub mod check;
pub mod execute;
pub mod terminate;
pub mod validation;

// Re-export main types
pub use check::*;
pub use execute::*;
pub use terminate::*;
pub use validation::*;
