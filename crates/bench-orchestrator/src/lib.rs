//! # Bench Orchestrator
//!
//! Runs a benchmark matrix against the audioserve server and aggregates the
//! results reported by an external load tool.
//!
//! This crate provides:
//! - Test parameters, suites and the standard matrix
//! - Configuration loading
//! - Server supervision and readiness probing
//! - Token provisioning
//! - Load tool invocation and result aggregation
//! - MatrixOrchestrator - the run loop
//! - Report building

pub mod auth;
pub mod config;
pub mod load;
pub mod orchestrator;
pub mod params;
pub mod readiness;
pub mod record;
pub mod report;
pub mod state;
pub mod supervisor;

#[cfg(test)]
mod test_support;

// Re-export main types
pub use auth::{AuthProvisioner, AuthToken, TokenProvider};
pub use config::{AuthConfig, BenchConfig, LoadConfig, ReadinessConfig, ServerConfig, SHARED_SECRET_ENV};
pub use load::{LoadInvoker, LoadRequest, LoadRunner, RetryPolicy};
pub use orchestrator::{MatrixOrchestrator, ResultEntry, RunFailure, RunReport, RunSettings};
pub use params::{ServerMode, TestMatrix, TestParams, TestSuite};
pub use readiness::{Endpoint, Readiness, TcpReadinessProbe};
pub use record::{combine, AggregatedResult, ResultAggregator, ResultRecord};
pub use report::{entry_label, Report};
pub use state::{SuiteState, SuiteStateMachine};
pub use supervisor::{ProcessSupervisor, RunningServer, ServerLauncher};
