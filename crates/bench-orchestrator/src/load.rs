//! Load tool invocation.
//!
//! The load generator is an external program (`oha` by default). For every
//! repetition we assemble its command line, run it to completion, and parse
//! its JSON summary into a [`ResultRecord`].
//!
//! Expected output shape (only the fields we read):
//!
//! ```json
//! {
//!   "summary": {
//!     "successRate": 1.0,
//!     "requestsPerSec": 5234.1,
//!     "average": 0.0019,
//!     "slowest": 0.0213,
//!     "fastest": 0.0002
//!   },
//!   "latencyPercentiles": { "p50": 0.0017 },
//!   "statusCodeDistribution": { "200": 52341 }
//! }
//! ```
//!
//! Latencies are seconds; the success rate is a ratio and is stored as a
//! percentage.

use crate::auth::{AuthToken, COOKIE_NAME};
use crate::config::{duration_serde, format_duration};
use crate::params::TestParams;
use crate::readiness::Endpoint;
use crate::record::ResultRecord;
use async_trait::async_trait;
use bench_common::{BenchError, Result};
use bench_process::{run_to_completion, CommandSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Everything needed to load-test one entry.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    pub params: &'a TestParams,
    pub endpoint: &'a Endpoint,
    pub token: Option<&'a AuthToken>,
    pub duration: Duration,
    pub repetitions: u32,
}

impl LoadRequest<'_> {
    /// `scheme://address:port/path`
    pub fn target_url(&self) -> String {
        self.endpoint.url(self.params.scheme(), self.params.path())
    }

    /// The token to send, if this entry asks for one.
    pub fn effective_token(&self) -> Option<&AuthToken> {
        if self.params.requires_token() {
            self.token
        } else {
            None
        }
    }
}

/// Runs repeated load tests for one entry.
#[async_trait]
pub trait LoadRunner: Send + Sync {
    /// Returns exactly `request.repetitions` records, in run order.
    async fn run(&self, request: &LoadRequest<'_>) -> Result<Vec<ResultRecord>>;
}

/// Upper bound for the wait between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Retry behaviour for a single repetition.
///
/// `max_attempts = 1` means no retry: the first failure aborts the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub retry_delay: Duration,
    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            backoff_rate: default_backoff_rate(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default()
    }

    pub fn new(max_attempts: u32, retry_delay: Duration, backoff_rate: f64) -> Self {
        Self {
            max_attempts,
            retry_delay,
            backoff_rate,
        }
    }

    /// Delay before the given retry (1 = first retry), capped at
    /// [`MAX_RETRY_DELAY`].
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        if self.retry_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * self.backoff_rate.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(BenchError::configuration(
                "Retry max_attempts must be at least 1",
            ));
        }
        if !(self.backoff_rate.is_finite() && self.backoff_rate >= 1.0) {
            return Err(BenchError::configuration(format!(
                "Retry backoff_rate must be >= 1.0, got {}",
                self.backoff_rate
            )));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_rate() -> f64 {
    1.5
}

/// [`LoadRunner`] backed by an external load tool process.
#[derive(Debug, Clone)]
pub struct LoadInvoker {
    tool: PathBuf,
    retry: RetryPolicy,
}

impl LoadInvoker {
    pub fn new(tool: impl Into<PathBuf>, retry: RetryPolicy) -> Self {
        Self {
            tool: tool.into(),
            retry,
        }
    }

    /// Command line for one repetition.
    pub fn build_invocation(&self, request: &LoadRequest<'_>) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.tool)
            .arg("-z")
            .arg(format_duration(request.duration))
            .arg("--no-tui")
            .arg("--json")
            .arg("--insecure");

        if request.params.use_http2() {
            spec = spec.arg("--http2");
        }

        if let Some(token) = request.effective_token() {
            spec = spec.args([
                "-H".to_string(),
                format!("Cookie: {}={}", COOKIE_NAME, token.as_str()),
            ]);
        }

        spec.arg(request.target_url())
    }

    async fn run_once(&self, request: &LoadRequest<'_>) -> Result<ResultRecord> {
        let spec = self.build_invocation(request);
        let target = request.target_url();

        let output = run_to_completion(&spec)
            .await
            .map_err(|e| BenchError::load_tool(&target, e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BenchError::load_tool(
                &target,
                format!("{} exited with {}: {}", spec.id(), output.status, stderr.trim()),
            ));
        }

        parse_output(&output.stdout).map_err(|reason| BenchError::load_tool(&target, reason))
    }
}

#[async_trait]
impl LoadRunner for LoadInvoker {
    async fn run(&self, request: &LoadRequest<'_>) -> Result<Vec<ResultRecord>> {
        let mut records = Vec::with_capacity(request.repetitions as usize);

        for repetition in 1..=request.repetitions {
            let mut attempt = 1;
            let record = loop {
                match self.run_once(request).await {
                    Ok(record) => break record,
                    Err(e) if attempt < self.retry.max_attempts => {
                        let delay = self.retry.delay_before_retry(attempt);
                        warn!(
                            "Load run {}/{} for {} failed (attempt {}/{}), retrying in {:?}: {}",
                            repetition,
                            request.repetitions,
                            request.params,
                            attempt,
                            self.retry.max_attempts,
                            delay,
                            e
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(e) => return Err(e),
                }
            };

            info!(
                "Run {}/{} for {}: {:.1} req/s, p50 {:?}, success {:.1}%",
                repetition,
                request.repetitions,
                request.params,
                record.requests_per_sec,
                record.median_latency,
                record.success_rate
            );
            records.push(record);
        }

        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolOutput {
    summary: ToolSummary,
    latency_percentiles: ToolPercentiles,
    #[serde(default)]
    status_code_distribution: HashMap<String, u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolSummary {
    success_rate: Option<f64>,
    requests_per_sec: Option<f64>,
    average: Option<f64>,
    slowest: Option<f64>,
    fastest: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ToolPercentiles {
    p50: Option<f64>,
}

/// Parse the load tool's JSON output.
pub fn parse_output(stdout: &[u8]) -> std::result::Result<ResultRecord, String> {
    let output: ToolOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("unparseable output: {}", e))?;
    debug!("Load tool summary: {:?}", output.summary);

    let summary = output.summary;
    let success_ratio = required("summary.successRate", summary.success_rate)?;
    let requests_per_sec = required("summary.requestsPerSec", summary.requests_per_sec)?;

    let mut status_codes = BTreeMap::new();
    for (code, count) in output.status_code_distribution {
        let code: u16 = code
            .trim()
            .parse()
            .map_err(|_| format!("invalid status code in distribution: {:?}", code))?;
        status_codes.insert(code, count);
    }

    Ok(ResultRecord {
        success_rate: success_ratio * 100.0,
        requests_per_sec,
        average_latency: seconds("summary.average", summary.average)?,
        median_latency: seconds("latencyPercentiles.p50", output.latency_percentiles.p50)?,
        max_latency: seconds("summary.slowest", summary.slowest)?,
        min_latency: seconds("summary.fastest", summary.fastest)?,
        status_codes,
    })
}

fn required(field: &str, value: Option<f64>) -> std::result::Result<f64, String> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(format!("{} is not a finite number: {}", field, v)),
        None => Err(format!("{} is missing", field)),
    }
}

fn seconds(field: &str, value: Option<f64>) -> std::result::Result<Duration, String> {
    let secs = required(field, value)?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{} is not a valid duration: {}", field, e))
}
