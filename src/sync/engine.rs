//! The long-poll sync state machine.
//!
//! ```text
//! Starting -> Polling -> (Processing -> Polling)* -> Stopped
//!                 \          /
//!                  > Backoff  (on transport error, same cursor)
//! ```
//!
//! Per iteration the engine issues one `/sync` long-poll carrying the current
//! cursor, decodes the batch, filters it to the target room, hands every
//! event to the bounded channel in server order, and only then advances the
//! in-memory cursor. That ordering is the at-least-once guarantee: a crash
//! mid-dispatch re-delivers the whole batch on restart instead of skipping
//! it. The cursor lives only in memory; a restarted process syncs from "now"
//! and silently misses events sent while offline (documented limitation).

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::api::wire::{self, JoinedRoomSection, SyncResponse};
use crate::api::{ApiRequest, Transport};
use crate::error::{SyncFatalError, TransportError};
use crate::event::{self, Event};
use crate::room::RoomHandle;
use crate::session::Session;
use crate::sync::backoff::Backoff;

/// Server-side long-poll hold time. The server may answer earlier when data
/// arrives; an empty response after the full hold is normal.
const POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side slack on top of the server hold before a poll counts as a
/// transport timeout.
const POLL_SLACK: Duration = Duration::from_secs(10);

/// Consecutive poll failures tolerated before giving up.
const MAX_CONSECUTIVE_FAILURES: u32 = 8;

/// Base delay between failed polls.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Cap for the delay between failed polls.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Polling,
    Processing,
    Backoff,
    Stopped,
}

/// The sync engine. Owns the pagination cursor; restartable only by
/// constructing a new engine with a persisted cursor.
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    session: Arc<Session>,
    room_id: String,
    since: Option<String>,
    state: EngineState,
    backoff: Backoff,
}

impl SyncEngine {
    /// Engine starting from "now" (no historical backfill).
    pub fn new(transport: Arc<dyn Transport>, session: Arc<Session>, room: &RoomHandle) -> Self {
        Self::with_cursor(transport, session, room, None)
    }

    /// Engine resuming from a previously observed cursor.
    pub fn with_cursor(
        transport: Arc<dyn Transport>,
        session: Arc<Session>,
        room: &RoomHandle,
        cursor: Option<String>,
    ) -> Self {
        Self {
            transport,
            session,
            room_id: room.room_id.clone(),
            since: cursor,
            state: EngineState::Starting,
            backoff: Backoff::new(BACKOFF_BASE, BACKOFF_CAP),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The cursor of the last fully dispatched batch.
    pub fn cursor(&self) -> Option<&str> {
        self.since.as_deref()
    }

    /// Run the poll/process loop until shutdown or a fatal condition.
    ///
    /// Events are delivered through `events` in server order; backpressure
    /// from a slow consumer blocks the loop rather than dropping anything.
    /// Flipping `shutdown` to `true` aborts an in-flight poll promptly.
    pub async fn run(
        &mut self,
        events: mpsc::Sender<Event>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SyncFatalError> {
        info!(room_id = %self.room_id, "sync engine starting");
        self.state = EngineState::Polling;
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                return self.stop();
            }

            let request = self.sync_request();
            let poll = {
                let transport = Arc::clone(&self.transport);
                async move { transport.request(request).await }
            };
            let outcome = tokio::select! {
                _ = shutdown.changed() => return self.stop(),
                outcome = poll => outcome,
            };

            let mut batch = match outcome.and_then(decode_sync) {
                Ok(batch) => batch,
                Err(err) => {
                    if let Some(fatal) = self.fatal_condition(&err) {
                        self.state = EngineState::Stopped;
                        return Err(fatal);
                    }

                    failures += 1;
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        self.state = EngineState::Stopped;
                        return Err(SyncFatalError::RetriesExhausted {
                            attempts: failures,
                            last: err,
                        });
                    }

                    self.state = EngineState::Backoff;
                    let delay = self.backoff.next_delay();
                    warn!(
                        error = %err,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "sync poll failed, backing off"
                    );
                    tokio::select! {
                        _ = shutdown.changed() => return self.stop(),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    self.state = EngineState::Polling;
                    continue;
                }
            };

            failures = 0;
            self.backoff.reset();
            self.state = EngineState::Processing;

            // Hand off the whole batch before the cursor moves.
            for ev in self.extract_events(batch.rooms.join.remove_entry(&self.room_id)) {
                if events.send(ev).await.is_err() {
                    self.state = EngineState::Stopped;
                    return Err(SyncFatalError::Channel);
                }
            }

            debug!(next_batch = %batch.next_batch, "batch dispatched, advancing cursor");
            self.since = Some(batch.next_batch);
            self.state = EngineState::Polling;
        }
    }

    fn stop(&mut self) -> Result<(), SyncFatalError> {
        info!("sync engine stopped");
        self.state = EngineState::Stopped;
        Ok(())
    }

    fn sync_request(&self) -> ApiRequest {
        let mut req = ApiRequest::get(format!("{}/sync", wire::API_PREFIX))
            .query("timeout", POLL_TIMEOUT.as_millis().to_string())
            .auth(&self.session.access_token)
            .timeout(POLL_TIMEOUT + POLL_SLACK);
        if let Some(since) = &self.since {
            req = req.query("since", since.clone());
        }
        req
    }

    /// Conditions that are never retried.
    ///
    /// A 401 (or `M_UNKNOWN_TOKEN`) means the token was revoked. A 400 on a
    /// request that carried `since` means the server no longer accepts the
    /// cursor; there is no historical replay, so resetting to "now" would
    /// hide a gap and the engine surfaces the condition instead.
    fn fatal_condition(&self, err: &TransportError) -> Option<SyncFatalError> {
        match err {
            TransportError::Api {
                status,
                errcode,
                message,
            } => {
                if *status == 401 || errcode.as_deref() == Some("M_UNKNOWN_TOKEN") {
                    Some(SyncFatalError::SessionInvalidated {
                        message: message.clone(),
                    })
                } else if *status == 400 && self.since.is_some() {
                    Some(SyncFatalError::CursorInvalidated {
                        message: message.clone(),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Flatten one joined-room section into events, preserving server order:
    /// state deltas first, then the timeline, then ephemeral signals.
    fn extract_events(&self, section: Option<(String, JoinedRoomSection)>) -> Vec<Event> {
        let Some((room_id, section)) = section else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(
            section.state.events.len()
                + section.timeline.events.len()
                + section.ephemeral.events.len(),
        );
        for raw in section
            .state
            .events
            .into_iter()
            .chain(section.timeline.events)
            .chain(section.ephemeral.events)
        {
            out.push(event::classify(&room_id, raw));
        }
        out
    }
}

fn decode_sync(value: Value) -> Result<SyncResponse, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))
}
