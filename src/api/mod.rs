//! Matrix client-server API plumbing.
//!
//! - [`transport`]: the [`Transport`] trait and its reqwest implementation,
//!   the sole network touchpoint of the process.
//! - [`wire`]: serde types for the endpoints the client uses.

pub mod transport;
pub mod wire;

pub use transport::{ApiRequest, HttpTransport, Method, Transport};
