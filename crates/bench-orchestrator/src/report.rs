//! Display-ready view of a run.
//!
//! Entries are grouped into one table per scheme. Each table has a row for
//! both HTTP versions and a column per entry label, in the order labels are first
//! seen; cells hold requests per second.

use crate::orchestrator::ResultEntry;
use crate::params::TestParams;
use bench_common::{HttpVersion, Scheme};
use std::fmt::Write;
use std::time::Duration;

/// Column label for an entry.
///
/// The path, plus `" 401"` when a non-root path is requested without the
/// token, plus `" no gzip"` when the token is sent but compression is off.
pub fn entry_label(params: &TestParams) -> String {
    let mut label = params.path().to_string();
    if !params.requires_token() && params.path() != "/" {
        label.push_str(" 401");
    }
    if !params.use_compression() && params.requires_token() {
        label.push_str(" no gzip");
    }
    label
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub version: HttpVersion,
    /// Requests per second, aligned with the table's labels
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub scheme: Scheme,
    pub labels: Vec<String>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    /// Every table has an HTTP/1.1 and an HTTP/2 row, filled or not.
    fn new(scheme: Scheme) -> Self {
        Self {
            scheme,
            labels: Vec::new(),
            rows: [HttpVersion::Http11, HttpVersion::Http2]
                .into_iter()
                .map(|version| ReportRow {
                    version,
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Later entries with the same label and version replace earlier ones.
    fn insert(&mut self, label: String, version: HttpVersion, rps: f64) {
        let column = match self.labels.iter().position(|l| *l == label) {
            Some(column) => column,
            None => {
                self.labels.push(label);
                for row in &mut self.rows {
                    row.values.push(None);
                }
                self.labels.len() - 1
            }
        };

        if let Some(row) = self.rows.iter_mut().find(|r| r.version == version) {
            row.values[column] = Some(rps);
        }
    }

    pub fn value(&self, version: HttpVersion, label: &str) -> Option<f64> {
        let column = self.labels.iter().position(|l| l == label)?;
        self.rows
            .iter()
            .find(|r| r.version == version)
            .and_then(|r| r.values[column])
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    tables: Vec<ReportTable>,
    entries: Vec<ResultEntry>,
}

impl Report {
    pub fn from_entries(entries: &[ResultEntry]) -> Self {
        let mut tables: Vec<ReportTable> = Vec::new();

        for entry in entries {
            let scheme = entry.params.scheme();
            let index = match tables.iter().position(|t| t.scheme == scheme) {
                Some(index) => index,
                None => {
                    tables.push(ReportTable::new(scheme));
                    tables.len() - 1
                }
            };
            tables[index].insert(
                entry_label(&entry.params),
                entry.params.http_version(),
                entry.result.stats.requests_per_sec,
            );
        }

        Self {
            tables,
            entries: entries.to_vec(),
        }
    }

    pub fn tables(&self) -> &[ReportTable] {
        &self.tables
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Requests/sec tables, one per scheme.
    pub fn render_table(&self) -> String {
        let mut out = String::new();

        for table in &self.tables {
            let head = table.scheme.as_str().to_uppercase();
            let cells: Vec<Vec<String>> = table
                .rows
                .iter()
                .map(|row| {
                    row.values
                        .iter()
                        .map(|v| v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v)))
                        .collect()
                })
                .collect();

            let first_width = table
                .rows
                .iter()
                .map(|r| r.version.to_string().len())
                .chain(std::iter::once(head.len()))
                .max()
                .unwrap_or(0);
            let widths: Vec<usize> = table
                .labels
                .iter()
                .enumerate()
                .map(|(column, label)| {
                    cells
                        .iter()
                        .map(|row| row[column].len())
                        .chain(std::iter::once(label.len()))
                        .max()
                        .unwrap_or(0)
                })
                .collect();

            let _ = write!(out, "{:<first_width$}", head);
            for (label, width) in table.labels.iter().zip(&widths) {
                let _ = write!(out, " | {:>width$}", label, width = *width);
            }
            out.push('\n');

            let rule_len = first_width + widths.iter().map(|w| w + 3).sum::<usize>();
            out.push_str(&"-".repeat(rule_len));
            out.push('\n');

            for (row, values) in table.rows.iter().zip(&cells) {
                let _ = write!(out, "{:<first_width$}", row.version.to_string());
                for (value, width) in values.iter().zip(&widths) {
                    let _ = write!(out, " | {:>width$}", value, width = *width);
                }
                out.push('\n');
            }
            out.push('\n');
        }

        out
    }

    /// One line per entry with the full aggregated statistics.
    pub fn render_details(&self) -> String {
        let mut out = String::new();

        for entry in &self.entries {
            let stats = &entry.result.stats;
            let codes: Vec<String> = stats
                .status_codes
                .iter()
                .map(|(code, count)| format!("{}:{}", code, count))
                .collect();

            let _ = writeln!(
                out,
                "suite {} | {} | runs {} | success {:.1}% | {:.1} req/s | avg {} p50 {} max {} min {} | {}",
                entry.suite + 1,
                entry.params,
                entry.result.runs,
                stats.success_rate,
                stats.requests_per_sec,
                millis(stats.average_latency),
                millis(stats.median_latency),
                millis(stats.max_latency),
                millis(stats.min_latency),
                codes.join(" ")
            );
        }

        out
    }
}

fn millis(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}
