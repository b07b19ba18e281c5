//! Benchmark outcomes and their aggregation.
//!
//! One [`ResultRecord`] is produced per load-tool run. Repeated runs of the
//! same test entry are folded into an [`AggregatedResult`]: scalar fields are
//! averaged, status code counts are summed key-wise.

use bench_common::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Outcome of a single load-tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Percentage of successful requests, 0-100.
    pub success_rate: f64,
    pub requests_per_sec: f64,
    pub average_latency: Duration,
    /// p50
    pub median_latency: Duration,
    pub max_latency: Duration,
    pub min_latency: Duration,
    pub status_codes: BTreeMap<u16, u64>,
}

impl ResultRecord {
    pub fn total_responses(&self) -> u64 {
        self.status_codes.values().sum()
    }
}

/// Combination of the repeated runs of one test entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    /// Same shape as a single run.
    pub stats: ResultRecord,
    /// Number of records folded in.
    pub runs: usize,
}

/// Incremental combiner.
///
/// Keeps running sums plus the record count; means are only computed in
/// [`finish`](ResultAggregator::finish), so records can be pushed one at a
/// time as repetitions complete.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    count: usize,
    success_rate: f64,
    requests_per_sec: f64,
    average_nanos: u128,
    median_nanos: u128,
    max_nanos: u128,
    min_nanos: u128,
    status_codes: BTreeMap<u16, u64>,
    // Single input is passed through untouched.
    first: Option<ResultRecord>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn push(&mut self, record: &ResultRecord) {
        if self.count == 0 {
            self.first = Some(record.clone());
        }
        self.count += 1;
        self.success_rate += record.success_rate;
        self.requests_per_sec += record.requests_per_sec;
        self.average_nanos += record.average_latency.as_nanos();
        self.median_nanos += record.median_latency.as_nanos();
        self.max_nanos += record.max_latency.as_nanos();
        self.min_nanos += record.min_latency.as_nanos();
        for (code, count) in &record.status_codes {
            *self.status_codes.entry(*code).or_insert(0) += count;
        }
    }

    /// Produce the combined result. Fails if nothing was pushed.
    pub fn finish(self) -> Result<AggregatedResult> {
        let n = self.count;
        if n == 0 {
            return Err(BenchError::configuration(
                "Cannot aggregate an empty set of results",
            ));
        }

        if n == 1 {
            if let Some(first) = self.first {
                return Ok(AggregatedResult { stats: first, runs: 1 });
            }
        }

        let mean_duration = |total: u128| {
            let nanos = total / n as u128;
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        };

        Ok(AggregatedResult {
            stats: ResultRecord {
                success_rate: self.success_rate / n as f64,
                requests_per_sec: self.requests_per_sec / n as f64,
                average_latency: mean_duration(self.average_nanos),
                median_latency: mean_duration(self.median_nanos),
                max_latency: mean_duration(self.max_nanos),
                min_latency: mean_duration(self.min_nanos),
                status_codes: self.status_codes,
            },
            runs: n,
        })
    }
}

/// Combine a non-empty sequence of records.
pub fn combine(records: &[ResultRecord]) -> Result<AggregatedResult> {
    let mut aggregator = ResultAggregator::new();
    for record in records {
        aggregator.push(record);
    }
    aggregator.finish()
}

#[cfg(test)]
pub(crate) fn sample_record(requests_per_sec: f64, codes: &[(u16, u64)]) -> ResultRecord {
    ResultRecord {
        success_rate: 100.0,
        requests_per_sec,
        average_latency: Duration::from_micros(1_250),
        median_latency: Duration::from_micros(1_000),
        max_latency: Duration::from_millis(20),
        min_latency: Duration::from_micros(300),
        status_codes: codes.iter().copied().collect(),
    }
}
