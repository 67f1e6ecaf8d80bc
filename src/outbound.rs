//! Outbound operations: message sends and the small room ops.
//!
//! The dispatcher shares only the read-only session and the transport with
//! the sync loop, so sends never queue behind an in-flight long-poll. Each
//! logical send uses one client-generated transaction id across all of its
//! retries; the server deduplicates on it, which makes the retry loop
//! at-least-once on the wire but exactly-once in the room.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::wire::{self, SendResponse};
use crate::api::{ApiRequest, Transport};
use crate::error::{SendError, TransportError};
use crate::session::Session;
use crate::sync::backoff::Backoff;

/// Attempts per logical send.
const SEND_ATTEMPTS: u32 = 3;

/// Base delay between send attempts.
const SEND_RETRY_BASE: Duration = Duration::from_millis(250);

/// Cap for the delay between send attempts.
const SEND_RETRY_CAP: Duration = Duration::from_secs(2);

/// Sends messages and room operations concurrently with the sync loop.
#[derive(Clone)]
pub struct OutboundDispatcher {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    room_id: String,
}

impl OutboundDispatcher {
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>, room_id: String) -> Self {
        Self {
            transport,
            session,
            room_id,
        }
    }

    /// Send a text message to the room.
    ///
    /// Returns the server-assigned event id. The message is not guaranteed
    /// to have arrived via sync by the time this returns; the UI must not
    /// assume a synchronous echo.
    pub async fn send(&self, body: &str) -> Result<String, SendError> {
        let txn_id = Uuid::new_v4();
        let path = format!(
            "{}/rooms/{}/send/m.room.message/{}",
            wire::API_PREFIX,
            wire::encode_segment(&self.room_id),
            txn_id
        );
        let payload = json!({"msgtype": "m.text", "body": body});

        let mut backoff = Backoff::new(SEND_RETRY_BASE, SEND_RETRY_CAP);
        let mut attempt = 1;
        loop {
            let req = ApiRequest::put(path.clone(), payload.clone()).auth(&self.session.access_token);
            match self.transport.request(req).await {
                Ok(value) => {
                    let response: SendResponse = serde_json::from_value(value)
                        .map_err(|e| SendError::Rejected(TransportError::Decode(e.to_string())))?;
                    debug!(txn_id = %txn_id, event_id = %response.event_id, "message sent");
                    return Ok(response.event_id);
                }
                Err(err) if err.is_transient() && attempt < SEND_ATTEMPTS => {
                    let delay = backoff.next_delay();
                    warn!(
                        txn_id = %txn_id,
                        attempt,
                        error = %err,
                        "send attempt failed, retrying with the same transaction id"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_transient() => {
                    return Err(SendError::RetriesExhausted {
                        attempts: attempt,
                        last: err,
                    })
                }
                Err(err) => return Err(SendError::Rejected(err)),
            }
        }
    }

    /// Invite a user to the room.
    pub async fn invite(&self, user_id: &str) -> Result<(), SendError> {
        let path = format!(
            "{}/rooms/{}/invite",
            wire::API_PREFIX,
            wire::encode_segment(&self.room_id)
        );
        let req = ApiRequest::post(path, json!({"user_id": user_id}))
            .auth(&self.session.access_token);
        self.transport
            .request(req)
            .await
            .map(|_| ())
            .map_err(SendError::Rejected)
    }

    /// Change our display name.
    pub async fn set_display_name(&self, name: &str) -> Result<(), SendError> {
        let path = format!(
            "{}/profile/{}/displayname",
            wire::API_PREFIX,
            wire::encode_segment(&self.session.user_id)
        );
        let req = ApiRequest::put(path, json!({"displayname": name}))
            .auth(&self.session.access_token);
        self.transport
            .request(req)
            .await
            .map(|_| ())
            .map_err(SendError::Rejected)
    }
}
