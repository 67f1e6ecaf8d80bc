//! Unified error handling for minimx.
//!
//! The taxonomy mirrors the lifecycle of a session: [`AuthError`] before any
//! room activity, [`RoomError`] after the session exists, [`TransportError`]
//! for transient faults absorbed by retry budgets, [`SyncFatalError`] for
//! anything that permanently stops the sync engine, and [`SendError`] local
//! to one outbound call.

use thiserror::Error;

// ============================================================================
// Transport Errors (transient unless stated otherwise)
// ============================================================================

/// Errors produced by the transport layer.
///
/// `Connection` and `Timeout` are transient and drive backoff/retry in the
/// callers. `Api` carries a server-side rejection and is never retried by the
/// transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    /// The server asked us to slow down. The wait, when present, comes from
    /// `retry_after_ms` and must be honored verbatim.
    #[error("rate limited by server")]
    RateLimited { retry_after: Option<std::time::Duration> },

    /// The server answered with a non-success status.
    #[error("server rejected request ({status}{}): {message}", errcode_suffix(.errcode))]
    Api {
        status: u16,
        errcode: Option<String>,
        message: String,
    },

    #[error("invalid response body: {0}")]
    Decode(String),
}

fn errcode_suffix(errcode: &Option<String>) -> String {
    match errcode {
        Some(code) => format!(" {code}"),
        None => String::new(),
    }
}

impl TransportError {
    /// Get a static error code string for diagnostics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection_error",
            Self::Timeout => "timeout",
            Self::RateLimited { .. } => "rate_limited",
            Self::Api { .. } => "api_error",
            Self::Decode(_) => "decode_error",
        }
    }

    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::RateLimited { .. }
        )
    }

    /// HTTP status for API rejections.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Matrix errcode for API rejections, if the body carried one.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            Self::Api { errcode, .. } => errcode.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Authentication Errors (fatal, surfaced before any room/sync activity)
// ============================================================================

/// Errors establishing the session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login failed: {0}")]
    Login(TransportError),

    #[error("username '{0}' is taken, try a different one")]
    UsernameTaken(String),

    #[error("invalid username: {0}")]
    UsernameInvalid(String),

    #[error("registration requires a captcha; register through a full client first")]
    CaptchaRequired,

    #[error("registration failed: {0}")]
    Registration(TransportError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AuthError {
    /// Get a static error code string for diagnostics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Login(_) => "login_failed",
            Self::UsernameTaken(_) => "username_taken",
            Self::UsernameInvalid(_) => "username_invalid",
            Self::CaptchaRequired => "captcha_required",
            Self::Registration(_) => "registration_failed",
            Self::Transport(_) => "transport_error",
        }
    }
}

// ============================================================================
// Room Errors (fatal, surfaced after the session is established)
// ============================================================================

/// Errors resolving or creating the target room.
#[derive(Debug, Error)]
pub enum RoomError {
    /// The alias neither resolved nor could be created (or a second
    /// resolution failed after creation, e.g. a concurrent alias collision).
    #[error("room '{alias}' could not be resolved: {source}")]
    Unresolvable {
        alias: String,
        source: TransportError,
    },

    #[error("joining room '{alias}' failed: {source}")]
    JoinDenied {
        alias: String,
        source: TransportError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl RoomError {
    /// Get a static error code string for diagnostics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unresolvable { .. } => "room_unresolvable",
            Self::JoinDenied { .. } => "join_denied",
            Self::Transport(_) => "transport_error",
        }
    }
}

// ============================================================================
// Sync Errors (terminal conditions of the sync engine)
// ============================================================================

/// Conditions that permanently stop the sync engine.
#[derive(Debug, Error)]
pub enum SyncFatalError {
    /// Consecutive transport failures crossed the retry budget.
    #[error("sync gave up after {attempts} consecutive failures: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    /// The server rejected the pagination cursor. There is no historical
    /// replay; resetting to "now" would hide a gap, so this surfaces instead.
    #[error("sync cursor rejected by server: {message}")]
    CursorInvalidated { message: String },

    /// The access token was revoked or expired.
    #[error("session invalidated by server: {message}")]
    SessionInvalidated { message: String },

    /// The event consumer went away; nothing left to deliver to.
    #[error("event channel closed by consumer")]
    Channel,
}

impl SyncFatalError {
    /// Get a static error code string for diagnostics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::CursorInvalidated { .. } => "cursor_invalidated",
            Self::SessionInvalidated { .. } => "session_invalidated",
            Self::Channel => "channel_closed",
        }
    }
}

// ============================================================================
// Send Errors (local to one outbound call)
// ============================================================================

/// Errors reported to the caller of one outbound operation.
///
/// These never affect the sync loop.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("send failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: TransportError },

    #[error("server rejected message: {0}")]
    Rejected(TransportError),
}

impl SendError {
    /// Get a static error code string for diagnostics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "send_retries_exhausted",
            Self::Rejected(_) => "send_rejected",
        }
    }
}
