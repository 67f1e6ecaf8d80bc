//! Event routing: the single place protocol drift is absorbed.
//!
//! The router is the sole consumer of the event channel. Recognized kinds go
//! to the [`UiSink`]; unknown shapes are forwarded to the diagnostics target
//! and otherwise ignored - never dropped silently, never a crash.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::event::{Event, EventKind, MembershipChange, StatePayload};

/// Diagnostics target for event shapes the client does not understand.
pub const UNHANDLED_TARGET: &str = "minimx::unhandled";

/// The UI collaborator. Implementations render; they never block for long.
pub trait UiSink: Send {
    fn on_message(&mut self, event: &Event, body: &str);
    fn on_membership(&mut self, event: &Event, change: &MembershipChange);
    fn on_state(&mut self, event: &Event, payload: &StatePayload);

    /// Unknown shapes, after they reached diagnostics. Default: ignore.
    fn on_unknown(&mut self, _event: &Event, _raw: &Value) {}
}

/// Consumes the ordered event stream and fans it out to the UI.
pub struct EventRouter<U: UiSink> {
    ui: U,
}

impl<U: UiSink> EventRouter<U> {
    pub fn new(ui: U) -> Self {
        Self { ui }
    }

    /// Drain the channel until the producer hangs up.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) -> U {
        while let Some(event) = events.recv().await {
            self.route(event);
        }
        self.ui
    }

    /// Route one event. Split out of [`run`] for direct testing.
    pub fn route(&mut self, event: Event) {
        match &event.kind {
            EventKind::Message { body } => self.ui.on_message(&event, body),
            EventKind::Membership { change, .. } => self.ui.on_membership(&event, change),
            EventKind::State { payload } => self.ui.on_state(&event, payload),
            EventKind::Unknown { raw } => {
                debug!(
                    target: UNHANDLED_TARGET,
                    room_id = %event.room_id,
                    raw = %raw,
                    "unhandled event shape"
                );
                self.ui.on_unknown(&event, raw);
            }
        }
    }
}
