//! minimx - minimal single-room Matrix chat client.
//!
//! One process, one authenticated session, one room. The crate is organized
//! around a substitutable [`api::Transport`] seam: every other component
//! (session establishment, room resolution, the sync engine, the outbound
//! dispatcher) issues protocol requests through it and carries no network
//! code of its own.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod outbound;
pub mod room;
pub mod router;
pub mod session;
pub mod sync;
pub mod telemetry;
