//! Run configuration.
//!
//! Loaded from YAML, with sensible defaults for everything except the server
//! paths:
//!
//! ```yaml
//! server:
//!   binary: ./target/release/audioserve
//!   working_dir: .
//!   client_dir: ../audioserve-web/dist
//!   collections: [./test_data]
//!   port: 3000
//!   ssl_cert: ./test_data/cert.pem
//!   ssl_key: ./test_data/key.pem
//! load:
//!   duration: 10s
//!   repetitions: 3
//! auth:
//!   request_timeout: 10s
//! ```
//!
//! The TLS copy of the plan runs after the plain one unless `https_mirror`
//! is set to `false`, so the certificate and key are required by default.

use crate::load::RetryPolicy;
use crate::params::{TestMatrix, TestSuite};
use bench_common::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod validation;

/// Environment variable holding the shared secret used for token provisioning.
pub const SHARED_SECRET_ENV: &str = "AUDIOSERVE_SHARED_SECRET";

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Custom plan; the standard matrix is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<Vec<TestSuite>>,
    /// Append a TLS copy of every suite.
    #[serde(default = "default_https_mirror")]
    pub https_mirror: bool,
}

/// How to launch the server-under-test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub binary: PathBuf,
    pub working_dir: PathBuf,
    pub client_dir: PathBuf,
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Collection directories passed as positional arguments
    #[serde(default)]
    pub collections: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_key: Option<PathBuf>,
    /// Extra environment for the server process
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "default_graceful_timeout", with = "duration_serde")]
    pub graceful_timeout: Duration,
    /// Redirect server stdout/stderr here instead of inheriting them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    pub fn new(
        binary: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        client_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            working_dir: working_dir.into(),
            client_dir: client_dir.into(),
            address: default_address(),
            port: default_port(),
            collections: Vec::new(),
            ssl_cert: None,
            ssl_key: None,
            environment: BTreeMap::new(),
            graceful_timeout: default_graceful_timeout(),
            log_file: None,
        }
    }
}

/// Load tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_tool")]
    pub tool: PathBuf,
    #[serde(default = "default_duration", with = "duration_serde")]
    pub duration: Duration,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            duration: default_duration(),
            repetitions: default_repetitions(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Readiness probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_timeout", with = "duration_serde")]
    pub timeout: Duration,
    #[serde(default = "default_readiness_interval", with = "duration_serde")]
    pub interval: Duration,
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout: default_readiness_timeout(),
            interval: default_readiness_interval(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

/// Token provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

impl BenchConfig {
    pub fn new(server: ServerConfig) -> Self {
        Self {
            server,
            load: LoadConfig::default(),
            readiness: ReadinessConfig::default(),
            auth: AuthConfig::default(),
            matrix: None,
            https_mirror: default_https_mirror(),
        }
    }

    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            BenchError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: BenchConfig = serde_yaml::from_str(content).map_err(|e| {
            BenchError::configuration(format!("Failed to parse YAML configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }

    /// The plan to run: the configured matrix (or the standard one), plus
    /// the TLS mirror when requested.
    pub fn matrix(&self) -> TestMatrix {
        let base = match &self.matrix {
            Some(suites) => TestMatrix::new(suites.clone()),
            None => TestMatrix::standard(),
        };
        if self.https_mirror {
            base.with_https_mirror()
        } else {
            base
        }
    }
}

// Default value functions
fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_graceful_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_tool() -> PathBuf {
    PathBuf::from("oha")
}

fn default_duration() -> Duration {
    Duration::from_secs(10)
}

fn default_repetitions() -> u32 {
    3
}

fn default_readiness_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_readiness_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_https_mirror() -> bool {
    true
}

/// Durations written as `"500ms"`, `"10s"` or `"2m"`.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn format_duration(duration: Duration) -> String {
        if duration.subsec_millis() == 0 {
            format!("{}s", duration.as_secs())
        } else {
            format!("{}ms", duration.as_millis())
        }
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num) = s.strip_suffix("ms") {
            let millis: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num) = s.strip_suffix('s') {
            let secs: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num) = s.strip_suffix('m') {
            let mins: u64 = num.parse().map_err(|_| format!("Invalid duration: {}", s))?;
            Ok(Duration::from_secs(mins * 60))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}

pub use duration_serde::{format_duration, parse_duration};
