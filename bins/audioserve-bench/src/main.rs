use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use bench_orchestrator::config::parse_duration;
use bench_orchestrator::{
    BenchConfig, MatrixOrchestrator, Report, ResultEntry, ServerConfig, SHARED_SECRET_ENV,
};

/// Audioserve benchmark runner
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Port the server listens on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Load test duration per run, e.g. "10s" (overrides config)
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Runs per test entry (overrides config)
    #[arg(short, long)]
    repetitions: Option<u32>,

    /// Skip the TLS copy of the plan
    #[arg(long)]
    no_https: bool,

    /// Server binary (overrides config)
    #[arg(long, value_name = "PATH")]
    server_binary: Option<PathBuf>,

    /// Load tool binary (overrides config)
    #[arg(long, value_name = "PATH")]
    load_tool: Option<PathBuf>,

    /// Server working directory, used without a config file
    #[arg(long, value_name = "DIR", default_value = ".")]
    working_dir: PathBuf,

    /// Client assets directory, used without a config file
    #[arg(long, value_name = "DIR", default_value = "client/dist")]
    client_dir: PathBuf,

    /// TLS certificate, used without a config file
    #[arg(long, value_name = "FILE")]
    ssl_cert: Option<PathBuf>,

    /// TLS key, used without a config file
    #[arg(long, value_name = "FILE")]
    ssl_key: Option<PathBuf>,

    /// Print the results collected so far when the run fails
    #[arg(long)]
    partial: bool,

    /// Collection directories served by the server, used without a config file
    #[arg(value_name = "COLLECTION")]
    collections: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.debug)?;

    info!("Starting audioserve benchmark");

    let config = build_config(&args)?;
    let shared_secret = std::env::var(SHARED_SECRET_ENV)
        .with_context(|| format!("Environment variable {} must be set", SHARED_SECRET_ENV))?;

    let matrix = config.matrix();
    info!(
        "Matrix: {} suites, {} entries",
        matrix.suites().len(),
        matrix.total_entries()
    );

    let orchestrator = MatrixOrchestrator::from_config(&config)?;

    // Dropping the run on interrupt kills the live server.
    let outcome = tokio::select! {
        outcome = orchestrator.run(&matrix, &shared_secret) => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping");
            anyhow::bail!("Benchmark interrupted");
        }
    };

    match outcome {
        Ok(report) => {
            let elapsed = report.finished_at - report.started_at;
            info!("Benchmark finished in {}s", elapsed.num_seconds());
            print_report(&report.entries);
            Ok(())
        }
        Err(failure) => {
            error!("Benchmark failed: {}", failure.error);
            if args.partial && !failure.completed.is_empty() {
                println!("Partial results ({} entries):", failure.completed.len());
                print_report(&failure.completed);
            }
            Err(failure.into())
        }
    }
}

fn build_config(args: &Args) -> Result<BenchConfig> {
    let mut config = match args.config {
        Some(ref path) => {
            info!("Config file: {}", path.display());
            BenchConfig::load_from_file(path)?
        }
        None => {
            let mut server = ServerConfig::new(
                args.server_binary
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("audioserve")),
                &args.working_dir,
                &args.client_dir,
            );
            server.collections = args.collections.clone();
            server.ssl_cert = args.ssl_cert.clone();
            server.ssl_key = args.ssl_key.clone();
            BenchConfig::new(server)
        }
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref binary) = args.server_binary {
        config.server.binary = binary.clone();
    }
    if let Some(ref tool) = args.load_tool {
        config.load.tool = tool.clone();
    }
    if let Some(duration) = args.duration {
        config.load.duration = duration;
    }
    if let Some(repetitions) = args.repetitions {
        config.load.repetitions = repetitions;
    }
    if args.no_https {
        config.https_mirror = false;
    }

    config.validate()?;
    Ok(config)
}

fn print_report(entries: &[ResultEntry]) {
    let report = Report::from_entries(entries);
    if report.is_empty() {
        return;
    }
    println!("{}", report.render_table());
    print!("{}", report.render_details());
}

fn initialize_logging(debug: bool) -> Result<()> {
    let level = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();

    Ok(())
}
