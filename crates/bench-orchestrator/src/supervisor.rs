//! Supervision of the server-under-test.
//!
//! [`ProcessSupervisor`] launches the server with a command line derived from
//! [`ServerConfig`] and a [`ServerMode`], and hands back a
//! [`RunningServer`]. The handle owns the child process for its whole life:
//! `stop()` terminates it gracefully (force kill after the graceful timeout)
//! and waits until it has exited, so the listening port is free again once
//! `stop()` returns. A handle dropped without `stop()` kills the child.

use crate::config::ServerConfig;
use crate::params::ServerMode;
use crate::readiness::{Endpoint, Readiness};
use async_trait::async_trait;
use bench_common::{BenchError, ProcessError, Result};
use bench_process::{
    spawn_process, terminate_gracefully, validate_directory, validate_executable, validate_file,
    CommandSpec,
};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{error, info, warn};

const SERVER_ID: &str = "server-under-test";

/// Starts the server-under-test in a given mode.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn start(&self, mode: ServerMode) -> Result<Box<dyn RunningServer>>;
}

/// Handle to a live server-under-test.
#[async_trait]
pub trait RunningServer: Send {
    fn pid(&self) -> Option<u32>;

    /// Resolves once the server has exited on its own, describing the exit.
    async fn wait_exit(&mut self) -> ProcessError;

    /// Terminate and wait for exit. Safe to call repeatedly or after the
    /// process already exited.
    async fn stop(&mut self) -> Result<()>;
}

/// Wait for readiness, failing early if the server dies while we wait.
pub async fn wait_ready(
    server: &mut dyn RunningServer,
    probe: &dyn Readiness,
    endpoint: &Endpoint,
) -> Result<()> {
    tokio::select! {
        ready = probe.wait_until_ready(endpoint) => ready,
        exited = server.wait_exit() => Err(exited.into()),
    }
}

/// Combine the outcome of a server scope with the result of stopping it.
///
/// The scope's own error wins; a stop failure after a failed scope is only
/// logged.
pub fn close_scope<T>(outcome: Result<T>, stopped: Result<()>) -> Result<T> {
    match (outcome, stopped) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(stop_error)) => Err(stop_error),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(stop_error)) => {
            error!("Failed to stop server after error: {}", stop_error);
            Err(e)
        }
    }
}

/// Launches the real server binary.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: ServerConfig,
    binary: PathBuf,
}

impl ProcessSupervisor {
    /// Validate paths up front; nothing is spawned if the binary or the
    /// working directory cannot be found.
    pub fn new(config: ServerConfig) -> Result<Self> {
        validate_directory(SERVER_ID, "working directory", &config.working_dir)?;
        let binary = validate_executable(SERVER_ID, &server_binary_path(&config))?;
        let binary = binary.canonicalize().map_err(|e| {
            ProcessError::configuration(
                SERVER_ID,
                format!("Cannot resolve executable {}: {}", binary.display(), e),
            )
        })?;

        if let Some(ref cert) = config.ssl_cert {
            validate_file(SERVER_ID, "TLS certificate", &config.working_dir.join(cert))?;
        }
        if let Some(ref key) = config.ssl_key {
            validate_file(SERVER_ID, "TLS key", &config.working_dir.join(key))?;
        }

        Ok(Self { config, binary })
    }

    /// Command line for the given mode.
    pub fn server_command(&self, mode: ServerMode) -> Result<CommandSpec> {
        server_command(&self.config, &self.binary, mode)
    }

    fn stdio(&self) -> Result<(Stdio, Stdio)> {
        match self.config.log_file {
            Some(ref path) => {
                let log_file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        ProcessError::spawn_failed(
                            SERVER_ID,
                            format!("Failed to open log file {}: {}", path.display(), e),
                        )
                    })?;
                let log_file_clone = log_file.try_clone().map_err(|e| {
                    ProcessError::spawn_failed(SERVER_ID, format!("Failed to clone log file: {}", e))
                })?;
                Ok((Stdio::from(log_file), Stdio::from(log_file_clone)))
            }
            None => Ok((Stdio::inherit(), Stdio::inherit())),
        }
    }
}

/// The server runs inside its working directory, so a relative path with a
/// directory part is taken from there. A bare name is looked up in `PATH`.
fn server_binary_path(config: &ServerConfig) -> PathBuf {
    let binary = &config.binary;
    if binary.is_relative() && binary.components().count() > 1 {
        config.working_dir.join(binary)
    } else {
        binary.clone()
    }
}

/// Derive the server command line.
pub fn server_command(config: &ServerConfig, binary: &std::path::Path, mode: ServerMode) -> Result<CommandSpec> {
    let mut spec = CommandSpec::new(binary)
        .current_dir(&config.working_dir)
        .env("RUST_LOG", "info")
        .args([
            "--listen".to_string(),
            format!("{}:{}", config.address, config.port),
            "--client-dir".to_string(),
            config.client_dir.display().to_string(),
            "--force-cache-update".to_string(),
        ]);

    if mode.compression {
        spec = spec.arg("--compress-responses");
    }

    if mode.tls {
        match (&config.ssl_cert, &config.ssl_key) {
            (Some(cert), Some(key)) => {
                spec = spec.args([
                    "--ssl-cert".to_string(),
                    cert.display().to_string(),
                    "--ssl-key".to_string(),
                    key.display().to_string(),
                ]);
            }
            _ => {
                return Err(BenchError::configuration(
                    "TLS requested but server.ssl_cert/server.ssl_key are not configured",
                ))
            }
        }
    }

    for (key, value) in &config.environment {
        spec = spec.env(key, value);
    }

    Ok(spec.args(config.collections.iter().map(|c| c.display().to_string())))
}

#[async_trait]
impl ServerLauncher for ProcessSupervisor {
    async fn start(&self, mode: ServerMode) -> Result<Box<dyn RunningServer>> {
        let spec = self.server_command(mode)?;
        let (stdout, stderr) = self.stdio()?;

        info!("Starting server ({}): {}", mode, spec);
        let child = spawn_process(&spec, stdout, stderr)?;
        let pid = child.id();
        info!("Server started with PID {:?}", pid);

        Ok(Box::new(SupervisedServer {
            id: format!("{} ({})", SERVER_ID, mode),
            child: Some(child),
            pid,
            graceful_timeout: self.config.graceful_timeout,
        }))
    }
}

/// Live child process of the server-under-test.
pub struct SupervisedServer {
    id: String,
    child: Option<Child>,
    pid: Option<u32>,
    graceful_timeout: Duration,
}

#[async_trait]
impl RunningServer for SupervisedServer {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn wait_exit(&mut self) -> ProcessError {
        match self.child.as_mut() {
            Some(child) => match child.wait().await {
                Ok(status) => ProcessError::exited_unexpectedly(&self.id, status.code()),
                Err(e) => ProcessError::stop_failed(&self.id, e.to_string()),
            },
            None => ProcessError::exited_unexpectedly(&self.id, None),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        let mut child = match self.child.take() {
            Some(child) => child,
            None => return Ok(()),
        };

        if let Ok(Some(status)) = child.try_wait() {
            info!("Server {} already exited: {}", self.id, status);
            return Ok(());
        }

        info!("Stopping server {} (PID {:?})", self.id, self.pid);
        let signalled = match child.id() {
            Some(pid) => match terminate_gracefully(pid) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Graceful termination of {} failed: {}", self.id, e);
                    false
                }
            },
            None => false,
        };

        if signalled {
            match timeout(self.graceful_timeout, child.wait()).await {
                Ok(Ok(status)) => {
                    info!("Server {} exited: {}", self.id, status);
                    return Ok(());
                }
                Ok(Err(e)) => {
                    return Err(ProcessError::stop_failed(&self.id, e.to_string()).into());
                }
                Err(_) => {
                    warn!(
                        "Server {} did not exit within {:?}, forcing kill",
                        self.id, self.graceful_timeout
                    );
                }
            }
        }

        // kill() also waits for the exit
        child
            .kill()
            .await
            .map_err(|e| ProcessError::stop_failed(&self.id, e.to_string()))?;
        info!("Server {} killed", self.id);
        Ok(())
    }
}

impl Drop for SupervisedServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if !matches!(child.try_wait(), Ok(Some(_))) {
                warn!("Server {} dropped while running, killing it", self.id);
                let _ = child.start_kill();
            }
        }
    }
}
