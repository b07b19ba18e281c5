//! Lifecycle of a matrix run.
//!
//! ```text
//! Idle -> ServerStarting -> Ready -> Running(0) -> ... -> Running(n-1)
//!      -> ServerStopping -> (next suite: ServerStarting | Done)
//! ```
//!
//! Any failure moves to `Aborted`, passing through `ServerStopping` whenever
//! a server is live. `Done` and `Aborted` are terminal.

use bench_common::{ProcessError, ProcessResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const HISTORY_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuiteState {
    /// Nothing started yet
    Idle,
    /// Server for the current suite launched, waiting for readiness
    ServerStarting,
    /// Server accepts connections, no entry started yet
    Ready,
    /// Load testing the entry with this index within the suite
    Running(usize),
    /// Server for the current suite is being torn down
    ServerStopping,
    /// All suites completed
    Done,
    /// Run failed
    Aborted,
}

impl fmt::Display for SuiteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuiteState::Idle => write!(f, "idle"),
            SuiteState::ServerStarting => write!(f, "server_starting"),
            SuiteState::Ready => write!(f, "ready"),
            SuiteState::Running(entry) => write!(f, "running({})", entry),
            SuiteState::ServerStopping => write!(f, "server_stopping"),
            SuiteState::Done => write!(f, "done"),
            SuiteState::Aborted => write!(f, "aborted"),
        }
    }
}

impl SuiteState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SuiteState::Done | SuiteState::Aborted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: SuiteState,
    pub to_state: SuiteState,
    /// Suite the transition belongs to, if any
    pub suite: Option<usize>,
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SuiteStateMachine {
    current_state: SuiteState,
    suite: Option<usize>,
    state_history: Vec<StateTransition>,
}

impl Default for SuiteStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SuiteStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SuiteState::Idle,
            suite: None,
            state_history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> SuiteState {
        self.current_state
    }

    /// Index of the suite currently (or last) being processed.
    pub fn current_suite(&self) -> Option<usize> {
        self.suite
    }

    pub fn state_history(&self) -> &[StateTransition] {
        &self.state_history
    }

    pub fn is_valid_transition(&self, target: SuiteState) -> bool {
        use SuiteState::*;

        match (self.current_state, target) {
            (Idle, ServerStarting) => true,
            (Idle, Aborted) => true,

            (ServerStarting, Ready) => true,
            (ServerStarting, ServerStopping) => true,
            // Spawn failed, nothing to stop
            (ServerStarting, Aborted) => true,

            (Ready, Running(0)) => true,
            (Ready, ServerStopping) => true,

            (Running(current), Running(next)) => next == current + 1,
            (Running(_), ServerStopping) => true,

            (ServerStopping, ServerStarting) => true,
            (ServerStopping, Done) => true,
            (ServerStopping, Aborted) => true,

            _ => false,
        }
    }

    pub fn transition_to(&mut self, target: SuiteState, reason: Option<String>) -> ProcessResult<()> {
        if !self.is_valid_transition(target) {
            return Err(ProcessError::invalid_state(
                "matrix run",
                target.to_string(),
                self.current_state.to_string(),
            ));
        }

        let now = Utc::now();
        let from = self.current_state;
        self.state_history.push(StateTransition {
            from_state: from,
            to_state: target,
            suite: self.suite,
            timestamp: now,
            reason,
        });
        if self.state_history.len() > HISTORY_LIMIT {
            self.state_history.remove(0);
        }

        self.current_state = target;

        tracing::debug!(
            "Matrix run transitioned from {} to {} (suite {:?})",
            from,
            target,
            self.suite
        );
        Ok(())
    }

    /// Begin the given suite by launching its server.
    pub fn start_suite(&mut self, suite: usize) -> ProcessResult<()> {
        let previous = self.suite;
        self.suite = Some(suite);
        let result = self.transition_to(
            SuiteState::ServerStarting,
            Some(format!("Starting server for suite {}", suite)),
        );
        if result.is_err() {
            self.suite = previous;
        }
        result
    }

    pub fn server_ready(&mut self) -> ProcessResult<()> {
        self.transition_to(SuiteState::Ready, Some("Server accepts connections".to_string()))
    }

    /// Advance to the next entry of the current suite.
    pub fn next_entry(&mut self) -> ProcessResult<usize> {
        let next = match self.current_state {
            SuiteState::Running(current) => current + 1,
            _ => 0,
        };
        self.transition_to(SuiteState::Running(next), None)?;
        Ok(next)
    }

    pub fn stopping(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(SuiteState::ServerStopping, Some(reason.into()))
    }

    pub fn finish(&mut self) -> ProcessResult<()> {
        self.transition_to(SuiteState::Done, Some("All suites completed".to_string()))
    }

    pub fn abort(&mut self, reason: impl Into<String>) -> ProcessResult<()> {
        self.transition_to(SuiteState::Aborted, Some(reason.into()))
    }

    /// Count transitions to a specific state
    pub fn count_transitions_to(&self, state: SuiteState) -> usize {
        self.state_history
            .iter()
            .filter(|t| t.to_state == state)
            .count()
    }
}
