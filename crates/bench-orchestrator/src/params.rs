//! Benchmark plan: test parameters, suites and the matrix.
//!
//! A [`TestParams`] fully determines one load-tool invocation. Parameters are
//! grouped into [`TestSuite`]s; every entry in a suite runs against the same
//! live server instance, so the entries must agree on everything that needs a
//! server restart to change (TLS and response compression). HTTP/2 and the
//! token may vary freely inside a suite.

use bench_common::{BenchError, HttpVersion, Result, Scheme};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters of one load test. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestParams {
    path: String,
    #[serde(default)]
    use_tls: bool,
    #[serde(default)]
    use_http2: bool,
    #[serde(default)]
    use_compression: bool,
    #[serde(default)]
    requires_token: bool,
}

impl TestParams {
    pub fn new(
        path: impl Into<String>,
        use_tls: bool,
        use_http2: bool,
        use_compression: bool,
        requires_token: bool,
    ) -> Self {
        Self {
            path: path.into(),
            use_tls,
            use_http2,
            use_compression,
            requires_token,
        }
    }

    /// Plain HTTP/1.1, no compression, no token.
    pub fn plain(path: impl Into<String>) -> Self {
        Self::new(path, false, false, false, false)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn use_tls(&self) -> bool {
        self.use_tls
    }

    pub fn use_http2(&self) -> bool {
        self.use_http2
    }

    pub fn use_compression(&self) -> bool {
        self.use_compression
    }

    pub fn requires_token(&self) -> bool {
        self.requires_token
    }

    pub fn scheme(&self) -> Scheme {
        Scheme::from_tls(self.use_tls)
    }

    pub fn http_version(&self) -> HttpVersion {
        HttpVersion::from_http2(self.use_http2)
    }

    /// Server configuration this entry needs.
    pub fn server_mode(&self) -> ServerMode {
        ServerMode {
            tls: self.use_tls,
            compression: self.use_compression,
        }
    }

    // Copy-with-override constructors

    pub fn with_tls(&self, use_tls: bool) -> Self {
        Self {
            use_tls,
            ..self.clone()
        }
    }

    pub fn with_http2(&self, use_http2: bool) -> Self {
        Self {
            use_http2,
            ..self.clone()
        }
    }

    pub fn with_compression(&self, use_compression: bool) -> Self {
        Self {
            use_compression,
            ..self.clone()
        }
    }

    pub fn with_token(&self, requires_token: bool) -> Self {
        Self {
            requires_token,
            ..self.clone()
        }
    }
}

impl fmt::Display for TestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}{}{})",
            self.scheme(),
            self.path,
            self.http_version(),
            if self.use_compression { ", gzip" } else { "" },
            if self.requires_token { ", token" } else { "" },
        )
    }
}

/// Server-side configuration that requires a restart to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ServerMode {
    pub tls: bool,
    pub compression: bool,
}

impl fmt::Display for ServerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tls={}, compression={}",
            if self.tls { "on" } else { "off" },
            if self.compression { "on" } else { "off" }
        )
    }
}

/// Ordered group of test entries sharing one live server instance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestSuite {
    entries: Vec<TestParams>,
}

impl TestSuite {
    pub fn new(entries: Vec<TestParams>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TestParams] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check the grouping rule and return the common server mode, or `None`
    /// for an empty suite, which is skipped.
    ///
    /// Fails if entries disagree on TLS or compression.
    pub fn validate(&self) -> Result<Option<ServerMode>> {
        let Some(first) = self.entries.first() else {
            return Ok(None);
        };
        let mode = first.server_mode();

        for (i, entry) in self.entries.iter().enumerate().skip(1) {
            if entry.use_tls != mode.tls {
                return Err(BenchError::configuration(format!(
                    "Entry {} ({}) has use_tls={} but the suite runs with use_tls={}",
                    i, entry.path, entry.use_tls, mode.tls
                )));
            }
            if entry.use_compression != mode.compression {
                return Err(BenchError::configuration(format!(
                    "Entry {} ({}) has use_compression={} but the suite runs with use_compression={}",
                    i, entry.path, entry.use_compression, mode.compression
                )));
            }
        }

        Ok(Some(mode))
    }

    /// Copy of this suite with every entry switched to TLS.
    pub fn https_mirror(&self) -> Self {
        Self {
            entries: self.entries.iter().map(|p| p.with_tls(true)).collect(),
        }
    }
}

impl From<Vec<TestParams>> for TestSuite {
    fn from(entries: Vec<TestParams>) -> Self {
        Self::new(entries)
    }
}

/// Full ordered plan of suites for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestMatrix {
    suites: Vec<TestSuite>,
}

impl TestMatrix {
    pub fn new(suites: Vec<TestSuite>) -> Self {
        Self { suites }
    }

    pub fn suites(&self) -> &[TestSuite] {
        &self.suites
    }

    pub fn total_entries(&self) -> usize {
        self.suites.iter().map(TestSuite::len).sum()
    }

    pub fn uses_tls(&self) -> bool {
        self.suites
            .iter()
            .flat_map(|s| s.entries())
            .any(TestParams::use_tls)
    }

    /// Validate every suite, naming the offending suite on failure.
    ///
    /// Empty suites map to `None`; a matrix without a single entry is an error.
    pub fn validate(&self) -> Result<Vec<Option<ServerMode>>> {
        if self.total_entries() == 0 {
            return Err(BenchError::configuration("Test matrix has no entries"));
        }
        self.suites
            .iter()
            .enumerate()
            .map(|(i, suite)| suite.validate().map_err(|e| e.context(format!("Suite {}", i + 1))))
            .collect()
    }

    /// Append a TLS copy of every suite after the existing ones.
    pub fn with_https_mirror(&self) -> Self {
        let mut suites = self.suites.clone();
        suites.extend(self.suites.iter().map(TestSuite::https_mirror));
        Self { suites }
    }

    /// The plan used when no matrix is configured.
    ///
    /// Two plain HTTP suites against the folder listing of the first
    /// collection. The uncompressed suite also measures the client root and
    /// the listing without the token, which the server answers with 401.
    pub fn standard() -> Self {
        const FOLDER: &str = "/0/folder/";

        let uncompressed = [("/", false), (FOLDER, false), (FOLDER, true)]
            .into_iter()
            .flat_map(|(path, token)| {
                [false, true].map(|http2| TestParams::new(path, false, http2, false, token))
            })
            .collect();
        let compressed = [false, true]
            .into_iter()
            .map(|http2| TestParams::new(FOLDER, false, http2, true, true))
            .collect();

        Self::new(vec![TestSuite::new(uncompressed), TestSuite::new(compressed)])
    }
}

impl From<Vec<TestSuite>> for TestMatrix {
    fn from(suites: Vec<TestSuite>) -> Self {
        Self::new(suites)
    }
}
