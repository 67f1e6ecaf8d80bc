//! Long-poll synchronization against the homeserver.
//!
//! - [`backoff`]: the bounded exponential delay policy shared with the
//!   transport layer.
//! - [`engine`]: the sync state machine that owns the pagination cursor and
//!   feeds the event channel.

pub mod backoff;
pub mod engine;

pub use engine::{EngineState, SyncEngine};
