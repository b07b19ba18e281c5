//! Token provisioning for protected paths.
//!
//! The server hands out a token in exchange for a challenge derived from the
//! shared secret:
//!
//! ```text
//! secret = base64(salt) "|" base64(sha256(shared_secret || salt))
//! ```
//!
//! with a fresh 32-byte random salt, sent form-encoded to
//! `POST /authenticate`. A 2xx response body is the token, which the load
//! tool then presents as the `audioserve_token` cookie.

use crate::params::ServerMode;
use crate::readiness::{Endpoint, Readiness};
use crate::supervisor::{close_scope, wait_ready, ServerLauncher};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bench_common::{BenchError, Result, ResultExt, Scheme};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Cookie the server reads the token from.
pub const COOKIE_NAME: &str = "audioserve_token";

/// Path of the token endpoint.
pub const AUTHENTICATE_PATH: &str = "/authenticate";

const SALT_LEN: usize = 32;

/// Opaque session token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

/// Build the challenge for `shared_secret` with a fresh random salt.
pub fn auth_challenge(shared_secret: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    auth_challenge_with_salt(shared_secret, &salt)
}

pub fn auth_challenge_with_salt(shared_secret: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(shared_secret.as_bytes());
    hasher.update(salt);
    let digest = hasher.finalize();
    format!("{}|{}", STANDARD.encode(salt), STANDARD.encode(digest))
}

/// Check a challenge against the shared secret.
pub fn verify_challenge(shared_secret: &str, challenge: &str) -> bool {
    let Some((salt, digest)) = challenge.split_once('|') else {
        return false;
    };
    let (Ok(salt), Ok(digest)) = (STANDARD.decode(salt), STANDARD.decode(digest)) else {
        return false;
    };

    let mut hasher = Sha256::new();
    hasher.update(shared_secret.as_bytes());
    hasher.update(&salt);
    hasher.finalize().as_slice() == digest.as_slice()
}

/// Exchange the shared secret for a token at a running server.
pub async fn request_token(
    endpoint: &Endpoint,
    shared_secret: &str,
    request_timeout: Duration,
) -> Result<AuthToken> {
    let url = endpoint.url(Scheme::Http, AUTHENTICATE_PATH);
    let uri: Uri = url
        .parse()
        .map_err(|e| BenchError::authentication(format!("Invalid URL {}: {}", url, e)))?;

    let body = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("secret", &auth_challenge(shared_secret))
        .finish();

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| BenchError::authentication(format!("Failed to build request: {}", e)))?;

    let client: Client<HttpConnector, Full<Bytes>> =
        Client::builder(TokioExecutor::new()).build_http();

    debug!("Requesting token from {}", url);
    let exchange = async {
        let response = client
            .request(request)
            .await
            .map_err(|e| BenchError::authentication(format!("Request to {} failed: {}", url, e)))?;
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| BenchError::authentication(format!("Failed to read response: {}", e)))?
            .to_bytes();
        Ok::<_, BenchError>((status, body))
    };

    let (status, body) = timeout(request_timeout, exchange).await.map_err(|_| {
        BenchError::authentication(format!("No response from {} within {:?}", url, request_timeout))
    })??;

    if !status.is_success() {
        return Err(BenchError::authentication(format!(
            "Server rejected the shared secret with status {}",
            status
        )));
    }

    let token = String::from_utf8(body.to_vec())
        .map_err(|_| BenchError::authentication("Token is not valid UTF-8"))?;
    if token.is_empty() {
        return Err(BenchError::authentication("Server returned an empty token"));
    }

    Ok(AuthToken::new(token))
}

/// Source of the token used by protected test entries.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch_token(&self, shared_secret: &str) -> Result<AuthToken>;
}

/// Provisions a token from a dedicated, short-lived server instance.
///
/// The server is started in the default mode (plain HTTP, no compression)
/// and is always stopped again, whether or not the exchange succeeded.
pub struct AuthProvisioner {
    launcher: Arc<dyn ServerLauncher>,
    probe: Arc<dyn Readiness>,
    endpoint: Endpoint,
    request_timeout: Duration,
}

impl AuthProvisioner {
    pub fn new(
        launcher: Arc<dyn ServerLauncher>,
        probe: Arc<dyn Readiness>,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            launcher,
            probe,
            endpoint,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

#[async_trait]
impl TokenProvider for AuthProvisioner {
    async fn fetch_token(&self, shared_secret: &str) -> Result<AuthToken> {
        info!("Provisioning auth token");
        let mut server = self.launcher.start(ServerMode::default()).await?;

        let outcome = async {
            wait_ready(server.as_mut(), self.probe.as_ref(), &self.endpoint).await?;
            request_token(&self.endpoint, shared_secret, self.request_timeout).await
        }
        .await;

        let stopped = server.stop().await;
        let token = close_scope(outcome, stopped).context("Token provisioning failed")?;
        info!("Auth token acquired");
        Ok(token)
    }
}
