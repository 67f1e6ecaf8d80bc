//! Serde types for the client-server API endpoints the client uses.
//!
//! Sync room events stay as raw [`Value`]s here; classification into the
//! typed event model happens in [`crate::event`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client-server API prefix shared by every endpoint.
pub const API_PREFIX: &str = "/_matrix/client/r0";

// ============================================================================
// Error body
// ============================================================================

/// Standard error body: `{"errcode": "M_...", "error": "...", ...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    pub errcode: Option<String>,
    pub error: Option<String>,
    pub retry_after_ms: Option<u64>,
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub user: &'a str,
    pub password: &'a str,
}

impl<'a> LoginRequest<'a> {
    pub fn password(user: &'a str, password: &'a str) -> Self {
        Self {
            kind: "m.login.password",
            user,
            password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub access_token: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub auth: RegisterAuth,
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> RegisterRequest<'a> {
    pub fn dummy(username: &'a str, password: &'a str) -> Self {
        Self {
            auth: RegisterAuth {
                kind: "m.login.dummy",
            },
            username,
            password,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterAuth {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

// ============================================================================
// Room endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct DirectoryResponse {
    pub room_id: String,
}

#[derive(Debug, Serialize)]
pub struct CreateRoomRequest<'a> {
    pub room_alias_name: &'a str,
    pub visibility: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomResponse {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinResponse {
    pub room_id: String,
}

#[derive(Debug, Deserialize)]
pub struct JoinedMembersResponse {
    /// user id -> profile, BTreeMap for a stable presentation order.
    pub joined: BTreeMap<String, MemberProfile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberProfile {
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendResponse {
    pub event_id: String,
}

// ============================================================================
// Sync
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SyncResponse {
    pub next_batch: String,
    #[serde(default)]
    pub rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncRooms {
    /// room id -> joined-room section. Rooms other than the target are
    /// ignored by the engine (single-room scope).
    #[serde(default)]
    pub join: BTreeMap<String, JoinedRoomSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct JoinedRoomSection {
    #[serde(default)]
    pub state: EventContainer,
    #[serde(default)]
    pub timeline: EventContainer,
    #[serde(default)]
    pub ephemeral: EventContainer,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventContainer {
    #[serde(default)]
    pub events: Vec<Value>,
}

// ============================================================================
// Path helpers
// ============================================================================

/// Percent-encode one path segment (room aliases contain `#` and `:`).
pub fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Localpart of a room alias: `#room:host` -> `room`.
pub fn alias_localpart(alias: &str) -> &str {
    let trimmed = alias.strip_prefix('#').unwrap_or(alias);
    trimmed.split(':').next().unwrap_or(trimmed)
}
