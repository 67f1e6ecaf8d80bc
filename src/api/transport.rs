//! HTTP transport for the Matrix client-server API.
//!
//! [`HttpTransport`] is the only place in the crate that touches the network.
//! Everything above it talks through the [`Transport`] trait, which keeps the
//! session, room, sync and outbound components testable with a scripted
//! substitute.
//!
//! Retry policy: connection failures and timeouts are retried with bounded
//! exponential backoff; a 429 waits exactly the server-supplied
//! `retry_after_ms` before the next attempt. Other API rejections propagate
//! to the caller immediately.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::wire::ErrorBody;
use crate::error::TransportError;
use crate::sync::backoff::Backoff;

/// Attempt budget for one logical request.
const MAX_ATTEMPTS: u32 = 3;

/// Base delay for transport-level retries.
const RETRY_BASE: Duration = Duration::from_millis(250);

/// Cap for transport-level retry delays.
const RETRY_CAP: Duration = Duration::from_secs(5);

/// Default per-request timeout. Long-polls override this.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP method of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
}

/// One request against the client-server API.
///
/// Built with the `get`/`post`/`put` constructors; `path` is relative to the
/// homeserver base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Bearer token; `None` for the pre-session endpoints (login, register).
    pub access_token: Option<String>,
    /// Overrides the default request timeout (used by the long-poll).
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, None)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path, Some(body))
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path, Some(body))
    }

    fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body,
            access_token: None,
            timeout: None,
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn auth(mut self, access_token: &str) -> Self {
        self.access_token = Some(access_token.to_owned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The substitutable network seam.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and return the decoded JSON body.
    async fn request(&self, req: ApiRequest) -> Result<Value, TransportError>;
}

/// Production transport backed by reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the given homeserver base URL.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("minimx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// The homeserver base URL this transport talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build(&self, req: &ApiRequest) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, req.path);
        let mut builder = match req.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
        };
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.body {
            builder = builder.json(body);
        }
        if let Some(token) = &req.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        }
        builder
    }

    async fn attempt(&self, req: &ApiRequest) -> Result<Value, TransportError> {
        let response = self.build(req).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(Value::Null);
            }
            return serde_json::from_slice(&bytes)
                .map_err(|e| TransportError::Decode(e.to_string()));
        }

        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap_or_default();

        if status.as_u16() == 429 {
            return Err(TransportError::RateLimited {
                retry_after: body.retry_after_ms.map(Duration::from_millis),
            });
        }

        Err(TransportError::Api {
            status: status.as_u16(),
            errcode: body.errcode,
            message: body
                .error
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_owned()),
        })
    }
}

/// The delay before the next attempt after a retryable failure.
///
/// A server-signalled rate limit is honored verbatim; everything else uses
/// the exponential policy. Falls back to the policy when the 429 carried no
/// `retry_after_ms`.
pub(crate) fn retry_delay(err: &TransportError, backoff: &mut Backoff) -> Duration {
    match err {
        TransportError::RateLimited {
            retry_after: Some(wait),
        } => *wait,
        _ => backoff.next_delay(),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, req: ApiRequest) -> Result<Value, TransportError> {
        let mut backoff = Backoff::new(RETRY_BASE, RETRY_CAP);

        let mut attempt = 1;
        loop {
            match self.attempt(&req).await {
                Ok(value) => {
                    debug!(path = %req.path, attempt, "request ok");
                    return Ok(value);
                }
                Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = retry_delay(&err, &mut backoff);
                    warn!(
                        path = %req.path,
                        attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transient transport failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
