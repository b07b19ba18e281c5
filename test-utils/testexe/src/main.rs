use bench_orchestrator::auth::{verify_challenge, AUTHENTICATE_PATH};
use bench_orchestrator::SHARED_SECRET_ENV;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Appends one JSON line per lifecycle event.
const LAUNCH_LOG_ENV: &str = "TESTEXE_LAUNCH_LOG";
/// Milliseconds to wait before binding the listener.
const STARTUP_DELAY_ENV: &str = "TESTEXE_STARTUP_DELAY_MS";
/// Exit with this code instead of listening.
const CRASH_ENV: &str = "TESTEXE_CRASH_CODE";

const TOKEN: &str = "testexe-token";

/// Stand-in for the audioserve server
#[derive(Parser, Debug)]
#[command(name = "testexe")]
#[command(about = "Accepts the audioserve command line and serves /authenticate", long_about = None)]
struct Args {
    /// Address and port to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,

    #[arg(long)]
    client_dir: Option<PathBuf>,

    #[arg(long)]
    force_cache_update: bool,

    #[arg(long)]
    compress_responses: bool,

    /// Recorded only, the listener stays plain HTTP
    #[arg(long)]
    ssl_cert: Option<PathBuf>,

    #[arg(long)]
    ssl_key: Option<PathBuf>,

    collections: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct LaunchEvent<'a> {
    event: &'a str,
    pid: u32,
    listen: &'a str,
    compression: bool,
    tls: bool,
    force_cache_update: bool,
    collections: &'a [PathBuf],
    rust_log: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let args = Args::parse();
    info!("Starting testexe with args: {:?}", args);

    let launch_log = std::env::var_os(LAUNCH_LOG_ENV).map(PathBuf::from);
    record(launch_log.as_deref(), &args, "start");

    if let Some(delay) = env_number(STARTUP_DELAY_ENV) {
        info!("Startup delay: waiting {}ms", delay);
        sleep(Duration::from_millis(delay)).await;
    }

    if let Some(code) = env_number(CRASH_ENV) {
        error!("Crashing with exit code {} as requested", code);
        record(launch_log.as_deref(), &args, "crash");
        std::process::exit(code as i32);
    }

    let secret = match std::env::var(SHARED_SECRET_ENV) {
        Ok(secret) => Arc::new(secret),
        Err(_) => {
            warn!("{} not set, every authentication will fail", SHARED_SECRET_ENV);
            Arc::new(String::new())
        }
    };

    let listener = match TcpListener::bind(&args.listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", args.listen, e);
            std::process::exit(1);
        }
    };
    info!("Listening on http://{}", args.listen);

    let server = tokio::spawn(serve(listener, secret));

    wait_for_signal().await;
    info!("Testexe received signal");
    server.abort();
    record(launch_log.as_deref(), &args, "stop");
}

async fn serve(listener: TcpListener, secret: Arc<String>) {
    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let secret = secret.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let secret = secret.clone();
                async move { respond(req, &secret).await }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Error serving connection: {}", e);
            }
        });
    }
}

async fn respond(req: Request<Incoming>, secret: &str) -> Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() == Method::POST && req.uri().path() == AUTHENTICATE_PATH {
        let body = req.into_body().collect().await?.to_bytes();
        let accepted = !secret.is_empty()
            && url::form_urlencoded::parse(&body)
                .find(|(key, _)| key == "secret")
                .map(|(_, challenge)| verify_challenge(secret, &challenge))
                .unwrap_or(false);

        return if accepted {
            debug!("Authentication accepted");
            Ok(Response::new(Full::new(Bytes::from(TOKEN))))
        } else {
            warn!("Authentication rejected");
            Ok(with_status(StatusCode::UNAUTHORIZED))
        };
    }

    Ok(Response::new(Full::new(Bytes::from("OK\n"))))
}

fn with_status(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn env_number(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn record(path: Option<&Path>, args: &Args, event: &str) {
    let Some(path) = path else {
        return;
    };

    let entry = LaunchEvent {
        event,
        pid: std::process::id(),
        listen: &args.listen,
        compression: args.compress_responses,
        tls: args.ssl_cert.is_some() && args.ssl_key.is_some(),
        force_cache_update: args.force_cache_update,
        collections: &args.collections,
        rust_log: std::env::var("RUST_LOG").ok(),
    };

    let line = match serde_json::to_string(&entry) {
        Ok(line) => line + "\n",
        Err(e) => {
            error!("Failed to encode launch event: {}", e);
            return;
        }
    };

    let written = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(line.as_bytes()));
    if let Err(e) = written {
        error!("Failed to write launch log {}: {}", path.display(), e);
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            error!("Failed to setup signal handlers");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received Ctrl+C");
}
