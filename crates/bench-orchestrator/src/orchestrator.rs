//! Drives a whole matrix run.
//!
//! The matrix is validated before anything starts. The token is provisioned
//! once, then each non-empty suite gets exactly one server instance: start, wait for
//! readiness, load test every entry in order, stop. The server of a suite is
//! always stopped before the next suite starts or the run ends, including on
//! failure.

use crate::auth::{AuthProvisioner, AuthToken, TokenProvider};
use crate::config::BenchConfig;
use crate::load::{LoadInvoker, LoadRequest, LoadRunner};
use crate::params::{ServerMode, TestMatrix, TestParams, TestSuite};
use crate::readiness::{Endpoint, Readiness, TcpReadinessProbe};
use crate::record::{combine, AggregatedResult};
use crate::state::{StateTransition, SuiteState, SuiteStateMachine};
use crate::supervisor::{close_scope, wait_ready, ProcessSupervisor, RunningServer, ServerLauncher};
use bench_common::{BenchError, Result, ResultExt};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Per-entry load settings shared by the whole run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub endpoint: Endpoint,
    pub duration: Duration,
    pub repetitions: u32,
}

/// Aggregated result of one test entry.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    /// Zero-based suite index
    pub suite: usize,
    pub params: TestParams,
    pub result: AggregatedResult,
}

/// Results of a completed run, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<ResultEntry>,
}

/// A failed run. The entries that completed before the failure are kept.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: BenchError,
    pub completed: Vec<ResultEntry>,
    pub history: Vec<StateTransition>,
}

pub struct MatrixOrchestrator {
    launcher: Arc<dyn ServerLauncher>,
    probe: Arc<dyn Readiness>,
    load: Arc<dyn LoadRunner>,
    tokens: Arc<dyn TokenProvider>,
    settings: RunSettings,
}

impl MatrixOrchestrator {
    pub fn new(
        launcher: Arc<dyn ServerLauncher>,
        probe: Arc<dyn Readiness>,
        load: Arc<dyn LoadRunner>,
        tokens: Arc<dyn TokenProvider>,
        settings: RunSettings,
    ) -> Self {
        Self {
            launcher,
            probe,
            load,
            tokens,
            settings,
        }
    }

    /// Wire up the real server supervisor, TCP probe, load tool and token
    /// provisioner.
    pub fn from_config(config: &BenchConfig) -> Result<Self> {
        let endpoint = Endpoint::new(&config.server.address, config.server.port);
        let launcher: Arc<dyn ServerLauncher> =
            Arc::new(ProcessSupervisor::new(config.server.clone())?);
        let probe: Arc<dyn Readiness> = Arc::new(TcpReadinessProbe::from_config(&config.readiness));

        bench_process::validate_executable("load tool", &config.load.tool)?;
        let load = Arc::new(LoadInvoker::new(&config.load.tool, config.load.retry.clone()));
        let tokens = Arc::new(
            AuthProvisioner::new(launcher.clone(), probe.clone(), endpoint.clone())
                .with_request_timeout(config.auth.request_timeout),
        );

        Ok(Self::new(
            launcher,
            probe,
            load,
            tokens,
            RunSettings {
                endpoint,
                duration: config.load.duration,
                repetitions: config.load.repetitions,
            },
        ))
    }

    /// Run every suite of the matrix in order.
    pub async fn run(
        &self,
        matrix: &TestMatrix,
        shared_secret: &str,
    ) -> std::result::Result<RunReport, RunFailure> {
        let started_at = Utc::now();
        let mut sm = SuiteStateMachine::new();
        let mut completed = Vec::with_capacity(matrix.total_entries());

        let modes = match matrix.validate() {
            Ok(modes) => modes,
            Err(e) => return Err(abort(sm, e, completed)),
        };

        info!(
            "Running {} suites ({} entries, {} x {:?} each) against {}",
            matrix.suites().len(),
            matrix.total_entries(),
            self.settings.repetitions,
            self.settings.duration,
            self.settings.endpoint
        );

        let token = match self.tokens.fetch_token(shared_secret).await {
            Ok(token) => token,
            Err(e) => return Err(abort(sm, e, completed)),
        };

        for (index, (suite, mode)) in matrix.suites().iter().zip(modes).enumerate() {
            let Some(mode) = mode else {
                info!("Suite {} has no entries, skipping", index + 1);
                continue;
            };
            let outcome = self
                .run_suite(index, suite, mode, &token, &mut sm, &mut completed)
                .await
                .context(format!("Suite {}", index + 1));
            if let Err(e) = outcome {
                return Err(abort(sm, e, completed));
            }
        }

        if let Err(e) = sm.finish() {
            return Err(abort(sm, e.into(), completed));
        }
        info!(
            "Matrix run complete: {} entries, {} server starts",
            completed.len(),
            sm.count_transitions_to(SuiteState::ServerStarting)
        );

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            entries: completed,
        })
    }

    async fn run_suite(
        &self,
        index: usize,
        suite: &TestSuite,
        mode: ServerMode,
        token: &AuthToken,
        sm: &mut SuiteStateMachine,
        completed: &mut Vec<ResultEntry>,
    ) -> Result<()> {
        sm.start_suite(index)?;
        info!("Suite {}: {} entries, {}", index + 1, suite.len(), mode);

        let mut server = self.launcher.start(mode).await?;

        let outcome = self
            .run_entries(index, suite, server.as_mut(), token, sm, completed)
            .await;

        let reason = match outcome {
            Ok(()) => "Suite complete".to_string(),
            Err(ref e) => e.to_string(),
        };
        let transition = sm.stopping(reason);
        let stopped = server.stop().await;

        close_scope(outcome, stopped)?;
        transition?;
        Ok(())
    }

    async fn run_entries(
        &self,
        index: usize,
        suite: &TestSuite,
        server: &mut dyn RunningServer,
        token: &AuthToken,
        sm: &mut SuiteStateMachine,
        completed: &mut Vec<ResultEntry>,
    ) -> Result<()> {
        wait_ready(server, self.probe.as_ref(), &self.settings.endpoint).await?;
        sm.server_ready()?;

        for params in suite.entries() {
            let entry = sm.next_entry()?;
            info!(
                "Suite {} entry {}/{}: {}",
                index + 1,
                entry + 1,
                suite.len(),
                params
            );

            let request = LoadRequest {
                params,
                endpoint: &self.settings.endpoint,
                token: Some(token),
                duration: self.settings.duration,
                repetitions: self.settings.repetitions,
            };
            let records = self.load.run(&request).await?;
            let result = combine(&records)?;

            completed.push(ResultEntry {
                suite: index,
                params: params.clone(),
                result,
            });
        }

        Ok(())
    }
}

fn abort(mut sm: SuiteStateMachine, error: BenchError, completed: Vec<ResultEntry>) -> RunFailure {
    error!("Matrix run aborted: {}", error);
    if let Err(e) = sm.abort(error.to_string()) {
        warn!("Failed to record abort: {}", e);
    }
    RunFailure {
        error,
        completed,
        history: sm.state_history().to_vec(),
    }
}
