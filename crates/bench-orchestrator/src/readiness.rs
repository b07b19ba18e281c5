//! Readiness probing for the server-under-test.
//!
//! The server is ready once it accepts TCP connections on its listening
//! port. The probe polls with a per-attempt connect timeout and a fixed
//! pause between attempts, and gives up after an overall deadline.
//!
//! Resolution failures count as "not ready yet": they are retried like a
//! refused connection, and the last one is reported if the deadline passes.

use crate::config::ReadinessConfig;
use async_trait::async_trait;
use bench_common::{BenchError, Result, Scheme};
use std::fmt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};

/// Address and port the server-under-test listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// `scheme://address:port/path`
    pub fn url(&self, scheme: Scheme, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}://{}{}", scheme, self, path)
        } else {
            format!("{}://{}/{}", scheme, self, path)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Blocks until an endpoint accepts connections.
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn wait_until_ready(&self, endpoint: &Endpoint) -> Result<()>;
}

/// TCP connect probe with bounded waiting.
#[derive(Debug, Clone)]
pub struct TcpReadinessProbe {
    timeout: Duration,
    interval: Duration,
    connect_timeout: Duration,
}

impl TcpReadinessProbe {
    pub fn new(timeout: Duration, interval: Duration, connect_timeout: Duration) -> Self {
        Self {
            timeout,
            interval,
            connect_timeout,
        }
    }

    pub fn from_config(config: &ReadinessConfig) -> Self {
        Self::new(config.timeout, config.interval, config.connect_timeout)
    }

    async fn try_connect(&self, endpoint: &Endpoint) -> std::result::Result<(), String> {
        let connect = TcpStream::connect((endpoint.address.as_str(), endpoint.port));
        match timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("connect timed out after {:?}", self.connect_timeout)),
        }
    }
}

impl Default for TcpReadinessProbe {
    fn default() -> Self {
        Self::from_config(&ReadinessConfig::default())
    }
}

#[async_trait]
impl Readiness for TcpReadinessProbe {
    async fn wait_until_ready(&self, endpoint: &Endpoint) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let last_error = match self.try_connect(endpoint).await {
                Ok(()) => {
                    info!(
                        "Server at {} is ready after {:?} ({} attempts)",
                        endpoint,
                        started.elapsed(),
                        attempts
                    );
                    return Ok(());
                }
                Err(e) => e,
            };
            debug!("Server at {} not ready (attempt {}): {}", endpoint, attempts, last_error);

            let now = Instant::now();
            if now + self.interval > deadline {
                return Err(BenchError::Readiness {
                    endpoint: endpoint.to_string(),
                    waited: now - started,
                    attempts,
                    last_error,
                });
            }
            sleep(self.interval).await;
        }
    }
}
