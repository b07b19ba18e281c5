//! In-process fakes shared by the unit tests.

use crate::auth::{verify_challenge, AuthToken, TokenProvider, AUTHENTICATE_PATH};
use crate::load::{LoadRequest, LoadRunner};
use crate::params::{ServerMode, TestParams};
use crate::readiness::{Endpoint, Readiness};
use crate::record::{sample_record, ResultRecord};
use crate::supervisor::{RunningServer, ServerLauncher};
use async_trait::async_trait;
use bench_common::{BenchError, ProcessError, Result};
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LaunchEvent {
    Start(ServerMode),
    Stop,
}

/// Records every start and stop instead of spawning anything.
#[derive(Default)]
pub(crate) struct FakeLauncher {
    events: Arc<Mutex<Vec<LaunchEvent>>>,
    fail_start: bool,
    exit_immediately: bool,
}

impl FakeLauncher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    /// Servers that die right after launch.
    pub(crate) fn crashing() -> Self {
        Self {
            exit_immediately: true,
            ..Self::default()
        }
    }

    pub(crate) fn events(&self) -> Vec<LaunchEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn starts(&self) -> Vec<ServerMode> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LaunchEvent::Start(mode) => Some(mode),
                LaunchEvent::Stop => None,
            })
            .collect()
    }

    pub(crate) fn stops(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == LaunchEvent::Stop)
            .count()
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn start(&self, mode: ServerMode) -> Result<Box<dyn RunningServer>> {
        if self.fail_start {
            return Err(ProcessError::spawn_failed("fake", "permission denied").into());
        }
        self.events.lock().unwrap().push(LaunchEvent::Start(mode));
        Ok(Box::new(FakeServer {
            events: self.events.clone(),
            stopped: false,
            exit_immediately: self.exit_immediately,
        }))
    }
}

struct FakeServer {
    events: Arc<Mutex<Vec<LaunchEvent>>>,
    stopped: bool,
    exit_immediately: bool,
}

#[async_trait]
impl RunningServer for FakeServer {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn wait_exit(&mut self) -> ProcessError {
        if !self.exit_immediately {
            std::future::pending::<()>().await;
        }
        ProcessError::exited_unexpectedly("fake", Some(1))
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.stopped {
            self.stopped = true;
            self.events.lock().unwrap().push(LaunchEvent::Stop);
        }
        Ok(())
    }
}

pub(crate) struct InstantProbe;

#[async_trait]
impl Readiness for InstantProbe {
    async fn wait_until_ready(&self, _endpoint: &Endpoint) -> Result<()> {
        Ok(())
    }
}

/// Never ready.
pub(crate) struct DeadProbe;

#[async_trait]
impl Readiness for DeadProbe {
    async fn wait_until_ready(&self, endpoint: &Endpoint) -> Result<()> {
        Err(BenchError::Readiness {
            endpoint: endpoint.to_string(),
            waited: Duration::from_millis(10),
            attempts: 1,
            last_error: "connection refused".to_string(),
        })
    }
}

/// Slow probe, so that a crashing server wins the race.
pub(crate) struct SlowProbe;

#[async_trait]
impl Readiness for SlowProbe {
    async fn wait_until_ready(&self, _endpoint: &Endpoint) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LoadCall {
    pub params: TestParams,
    pub token: Option<String>,
    pub repetitions: u32,
}

/// Produces `100, 200, 300, ...` requests per second for successive
/// repetitions; fails on the configured call.
#[derive(Default)]
pub(crate) struct FakeLoad {
    calls: Mutex<Vec<LoadCall>>,
    fail_on_call: Option<usize>,
}

impl FakeLoad {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<LoadCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoadRunner for FakeLoad {
    async fn run(&self, request: &LoadRequest<'_>) -> Result<Vec<ResultRecord>> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(LoadCall {
                params: request.params.clone(),
                token: request.effective_token().map(|t| t.as_str().to_string()),
                repetitions: request.repetitions,
            });
            calls.len() - 1
        };

        if self.fail_on_call == Some(call) {
            return Err(BenchError::load_tool(request.target_url(), "exit status: 1"));
        }

        Ok((1..=request.repetitions)
            .map(|r| sample_record(100.0 * r as f64, &[(200, 10)]))
            .collect())
    }
}

pub(crate) struct FakeTokens {
    token: String,
    calls: AtomicUsize,
}

impl FakeTokens {
    pub(crate) fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FakeTokens {
    async fn fetch_token(&self, _shared_secret: &str) -> Result<AuthToken> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AuthToken::new(&self.token))
    }
}

/// Minimal token endpoint: answers the challenge for `secret` with `token`.
pub(crate) async fn spawn_auth_server(secret: &str, token: &str) -> (u16, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let secret = Arc::new(secret.to_string());
    let token = Arc::new(token.to_string());

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let secret = secret.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let secret = secret.clone();
                    let token = token.clone();
                    async move { answer(req, &secret, &token).await }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    (port, handle)
}

async fn answer(
    req: Request<Incoming>,
    secret: &str,
    token: &str,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    if req.method() != Method::POST || req.uri().path() != AUTHENTICATE_PATH {
        return Ok(status_only(StatusCode::NOT_FOUND));
    }

    let body = req.into_body().collect().await?.to_bytes();
    let accepted = url::form_urlencoded::parse(&body)
        .find(|(key, _)| key == "secret")
        .map(|(_, challenge)| verify_challenge(secret, &challenge))
        .unwrap_or(false);

    if accepted {
        Ok(Response::new(Full::new(Bytes::from(token.to_string()))))
    } else {
        Ok(status_only(StatusCode::UNAUTHORIZED))
    }
}

fn status_only(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
