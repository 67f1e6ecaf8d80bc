//! Integration test common infrastructure.
//!
//! Provides a scripted [`MockTransport`] standing in for the homeserver at
//! the transport seam, plus JSON fixtures for the responses the client
//! consumes.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use minimx::api::{ApiRequest, Method, Transport};
use minimx::error::TransportError;
use minimx::session::Session;

/// One scripted reaction to a matching request.
pub enum Step {
    /// Respond immediately.
    Ok(Value),
    /// Respond after a delay (long-poll hold, in-flight request).
    OkAfter(Duration, Value),
    /// Fail immediately.
    Err(TransportError),
    /// Never respond; the request stays in flight until cancelled.
    Hang,
}

struct Route {
    matcher: &'static str,
    steps: VecDeque<Step>,
}

/// A request the mock saw, for sequence assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub access_token: Option<String>,
    pub at: tokio::time::Instant,
}

impl RecordedRequest {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted transport. Steps are registered per path substring and consumed
/// front to back. A request to a path with no route at all panics so a typo
/// fails loudly; an exhausted route behaves like [`Step::Hang`], which lets a
/// trailing poll stay in flight while the test shuts the engine down.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue one step for requests whose path contains `matcher`.
    pub fn expect(&self, matcher: &'static str, step: Step) {
        let mut routes = self.routes.lock().expect("routes lock");
        if let Some(route) = routes.iter_mut().find(|r| r.matcher == matcher) {
            route.steps.push_back(step);
        } else {
            routes.push(Route {
                matcher,
                steps: VecDeque::from([step]),
            });
        }
    }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().expect("log lock").clone()
    }

    /// Arrival order of paths, for sequence assertions.
    pub fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    /// Requests whose path contains `matcher`.
    pub fn requests_to(&self, matcher: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.contains(matcher))
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, req: ApiRequest) -> Result<Value, TransportError> {
        self.log.lock().expect("log lock").push(RecordedRequest {
            method: req.method,
            path: req.path.clone(),
            query: req.query.clone(),
            body: req.body.clone(),
            access_token: req.access_token.clone(),
            at: tokio::time::Instant::now(),
        });

        let step = {
            let mut routes = self.routes.lock().expect("routes lock");
            match routes.iter_mut().find(|r| req.path.contains(r.matcher)) {
                Some(route) => route.steps.pop_front(),
                None => panic!("unscripted request path: {}", req.path),
            }
        };

        match step {
            Some(Step::Ok(value)) => Ok(value),
            Some(Step::OkAfter(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(Step::Err(err)) => Err(err),
            Some(Step::Hang) | None => std::future::pending().await,
        }
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const ROOM_ID: &str = "!room:example.org";
pub const ROOM_ALIAS: &str = "#room:example.org";

pub fn session() -> Arc<Session> {
    Arc::new(Session {
        homeserver: "https://matrix.example.org".into(),
        user_id: "@alice:example.org".into(),
        access_token: "syt_test_token".into(),
        device_id: Some("MINIMXDEV".into()),
    })
}

pub fn login_ok() -> Value {
    json!({
        "user_id": "@alice:example.org",
        "access_token": "syt_test_token",
        "device_id": "MINIMXDEV"
    })
}

pub fn api_error(status: u16, errcode: &str, message: &str) -> TransportError {
    TransportError::Api {
        status,
        errcode: Some(errcode.into()),
        message: message.into(),
    }
}

pub fn connection_error() -> TransportError {
    TransportError::Connection("connection refused".into())
}

pub fn message_event(sender: &str, body: &str) -> Value {
    json!({
        "type": "m.room.message",
        "sender": sender,
        "event_id": format!("${body}:example.org"),
        "origin_server_ts": 1_700_000_000_000_i64,
        "content": {"msgtype": "m.text", "body": body}
    })
}

/// A sync batch holding timeline events for one room.
pub fn sync_batch(next_batch: &str, room_id: &str, events: Vec<Value>) -> Value {
    json!({
        "next_batch": next_batch,
        "rooms": {"join": {room_id: {"timeline": {"events": events}}}}
    })
}

pub fn empty_sync(next_batch: &str) -> Value {
    json!({"next_batch": next_batch})
}
