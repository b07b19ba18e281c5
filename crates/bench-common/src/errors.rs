//! Error types for the benchmark runner.
//!
//! Every failure in a run is fatal: nothing is recovered locally, the live
//! server-under-test is torn down, and the error surfaces to the caller.
//! The variants below map onto that taxonomy:
//!
//! - configuration problems detected before any process starts
//! - process failures of the server-under-test
//! - readiness timeouts
//! - authentication failures while provisioning the token
//! - load tool failures (nonzero exit or unparseable output)
//!
//! ```rust
//! use bench_common::{BenchError, ErrorKind, Result};
//!
//! fn check_repetitions(n: u32) -> Result<()> {
//!     if n == 0 {
//!         return Err(BenchError::configuration("repetitions must be at least 1"));
//!     }
//!     Ok(())
//! }
//!
//! let err = check_repetitions(0).unwrap_err();
//! assert_eq!(err.kind(), ErrorKind::Configuration);
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for benchmark operations.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Coarse classification of a [`BenchError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Process,
    Readiness,
    Authentication,
    LoadTool,
    Io,
}

/// Main error type for a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Missing paths or binaries, malformed suite grouping, invalid settings.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The server-under-test failed to launch, stop, or exited unexpectedly.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The server never started accepting connections within the deadline.
    #[error("Server at {endpoint} not ready after {waited:?} ({attempts} attempts): {last_error}")]
    Readiness {
        endpoint: String,
        waited: Duration,
        attempts: u32,
        last_error: String,
    },

    /// Token provisioning was rejected or produced an empty token.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The load tool exited with a nonzero status or printed garbage.
    #[error("Load tool error for {target}: {reason}")]
    LoadTool { target: String, reason: String },

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error with additional context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<BenchError>,
    },
}

impl BenchError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn load_tool(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadTool {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Adds context to an error.
    ///
    /// # Example
    /// ```
    /// use bench_common::{BenchError, ErrorKind};
    ///
    /// let err = BenchError::authentication("empty token").context("Provisioning token");
    /// assert!(err.to_string().starts_with("Provisioning token"));
    /// assert_eq!(err.kind(), ErrorKind::Authentication);
    /// ```
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Classifies the error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Process(ProcessError::Configuration { .. }) => ErrorKind::Configuration,
            Self::Process(_) => ErrorKind::Process,
            Self::Readiness { .. } => ErrorKind::Readiness,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::LoadTool { .. } => ErrorKind::LoadTool,
            Self::Io(_) => ErrorKind::Io,
            Self::WithContext { source, .. } => source.kind(),
        }
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}

// ==============================================================================
// Process Errors
// ==============================================================================

/// Errors raised by the low-level process primitives and the supervisor.
#[derive(Error, Debug, Clone)]
pub enum ProcessError {
    #[error("Process spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    #[error("Process stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Process exited unexpectedly: {id} - exit code {exit_code:?}")]
    ExitedUnexpectedly { id: String, exit_code: Option<i32> },

    #[error("Process configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    #[error("Invalid state transition for {id}: cannot go to {target} from {current}")]
    InvalidState {
        id: String,
        target: String,
        current: String,
    },
}

impl ProcessError {
    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn exited_unexpectedly(id: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ExitedUnexpectedly {
            id: id.into(),
            exit_code,
        }
    }

    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        target: impl Into<String>,
        current: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            target: target.into(),
            current: current.into(),
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
