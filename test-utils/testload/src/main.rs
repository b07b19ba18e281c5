use clap::Parser;
use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

/// Appends one JSON line per invocation.
const INVOCATION_LOG_ENV: &str = "TESTLOAD_LOG";
/// Fail when the target URL contains this string.
const FAIL_MATCH_ENV: &str = "TESTLOAD_FAIL_MATCH";
/// Requests per second to report.
const RPS_ENV: &str = "TESTLOAD_RPS";

/// Stand-in for the oha load tool
#[derive(Parser, Debug)]
#[command(name = "testload")]
struct Args {
    /// Test duration, e.g. "1s"
    #[arg(short = 'z')]
    duration: String,

    #[arg(long)]
    no_tui: bool,

    #[arg(long)]
    json: bool,

    #[arg(long)]
    insecure: bool,

    #[arg(long)]
    http2: bool,

    /// Extra request headers
    #[arg(short = 'H')]
    headers: Vec<String>,

    url: String,
}

#[derive(Debug, Serialize)]
struct Invocation<'a> {
    url: &'a str,
    duration: &'a str,
    no_tui: bool,
    json: bool,
    insecure: bool,
    http2: bool,
    headers: &'a [String],
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(path) = std::env::var_os(INVOCATION_LOG_ENV) {
        let invocation = Invocation {
            url: &args.url,
            duration: &args.duration,
            no_tui: args.no_tui,
            json: args.json,
            insecure: args.insecure,
            http2: args.http2,
            headers: &args.headers,
        };
        if let Err(e) = append_line(Path::new(&path), &invocation) {
            eprintln!("failed to write invocation log: {}", e);
            return ExitCode::from(2);
        }
    }

    if let Ok(pattern) = std::env::var(FAIL_MATCH_ENV) {
        if !pattern.is_empty() && args.url.contains(&pattern) {
            eprintln!("connection refused: {}", args.url);
            return ExitCode::FAILURE;
        }
    }

    let rps: f64 = std::env::var(RPS_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000.0);
    let protected = args.headers.iter().any(|h| h.starts_with("Cookie:"));
    let status = if protected || url_path(&args.url) == "/" { "200" } else { "401" };

    let output = json!({
        "summary": {
            "successRate": 1.0,
            "total": 1.0,
            "slowest": 0.02,
            "fastest": 0.0003,
            "average": 0.00125,
            "requestsPerSec": rps,
        },
        "latencyPercentiles": {
            "p10": 0.0005,
            "p50": 0.001,
            "p99": 0.015,
        },
        "statusCodeDistribution": {
            status: 100,
        },
        "errorDistribution": {},
    });

    println!("{}", output);
    ExitCode::SUCCESS
}

fn url_path(url: &str) -> &str {
    url.split_once("://")
        .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
        .unwrap_or("/")
}

fn append_line(path: &Path, value: &impl Serialize) -> std::io::Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(line.as_bytes())
}
