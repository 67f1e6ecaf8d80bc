//! Room alias resolution with creation fallback.
//!
//! The alias -> id mapping is resolved exactly once per process lifetime. If
//! the directory has no mapping the room is created with the alias as its
//! public identifier; a second failure after creation (for example an alias
//! collision introduced concurrently by another client) is fatal.

use serde_json::json;
use tracing::{debug, info};

use crate::api::wire::{
    self, CreateRoomRequest, CreateRoomResponse, DirectoryResponse, JoinedMembersResponse,
};
use crate::api::{ApiRequest, Transport};
use crate::error::{RoomError, TransportError};
use crate::session::Session;

/// The resolved target room. Read-only after resolution.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    pub alias: String,
    pub room_id: String,
}

/// One member of the room, used to seed the UI before sync starts.
#[derive(Debug, Clone)]
pub struct Member {
    pub user_id: String,
    pub display_name: Option<String>,
}

/// Resolve the alias to a room id and join it, creating the room when the
/// alias is unmapped.
pub async fn resolve_or_create(
    transport: &dyn Transport,
    session: &Session,
    alias: &str,
) -> Result<RoomHandle, RoomError> {
    info!(alias, "resolving room");

    let room_id = match resolve(transport, session, alias).await {
        Ok(room_id) => {
            join(transport, session, &room_id)
                .await
                .map_err(|source| RoomError::JoinDenied {
                    alias: alias.to_owned(),
                    source,
                })?;
            room_id
        }
        Err(err) if err.status() == Some(404) => {
            info!(alias, "room not found, creating it");
            // Creation joins the creator implicitly.
            create(transport, session, alias)
                .await
                .map_err(|source| RoomError::Unresolvable {
                    alias: alias.to_owned(),
                    source,
                })?
        }
        Err(source) => {
            return Err(RoomError::Unresolvable {
                alias: alias.to_owned(),
                source,
            })
        }
    };

    info!(alias, room_id = %room_id, "room resolved");

    Ok(RoomHandle {
        alias: alias.to_owned(),
        room_id,
    })
}

/// Current joined members, for the initial user-list population.
pub async fn joined_members(
    transport: &dyn Transport,
    session: &Session,
    room_id: &str,
) -> Result<Vec<Member>, RoomError> {
    let path = format!(
        "{}/rooms/{}/joined_members",
        wire::API_PREFIX,
        wire::encode_segment(room_id)
    );
    let value = transport
        .request(ApiRequest::get(path).auth(&session.access_token))
        .await?;
    let response: JoinedMembersResponse =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;

    debug!(count = response.joined.len(), "fetched joined members");

    Ok(response
        .joined
        .into_iter()
        .map(|(user_id, profile)| Member {
            user_id,
            display_name: profile.display_name,
        })
        .collect())
}

async fn resolve(
    transport: &dyn Transport,
    session: &Session,
    alias: &str,
) -> Result<String, TransportError> {
    let path = format!(
        "{}/directory/room/{}",
        wire::API_PREFIX,
        wire::encode_segment(alias)
    );
    let value = transport
        .request(ApiRequest::get(path).auth(&session.access_token))
        .await?;
    let response: DirectoryResponse =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(response.room_id)
}

async fn join(
    transport: &dyn Transport,
    session: &Session,
    room_id: &str,
) -> Result<(), TransportError> {
    let path = format!(
        "{}/join/{}",
        wire::API_PREFIX,
        wire::encode_segment(room_id)
    );
    transport
        .request(ApiRequest::post(path, json!({})).auth(&session.access_token))
        .await?;
    Ok(())
}

async fn create(
    transport: &dyn Transport,
    session: &Session,
    alias: &str,
) -> Result<String, TransportError> {
    let body = serde_json::to_value(CreateRoomRequest {
        room_alias_name: wire::alias_localpart(alias),
        visibility: "public",
    })
    .map_err(|e| TransportError::Decode(e.to_string()))?;

    let value = transport
        .request(
            ApiRequest::post(format!("{}/createRoom", wire::API_PREFIX), body)
                .auth(&session.access_token),
        )
        .await?;
    let response: CreateRoomResponse =
        serde_json::from_value(value).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(response.room_id)
}
