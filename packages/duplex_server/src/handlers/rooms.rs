//! Inbox listing and room lookup/creation.

use axum::{
    Json,
    extract::{Path, State},
};
use duplex_core::{ApiEnvelope, Meta, Room};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// `GET /api/rooms` — the inbox: rooms the caller participates in, most
/// recently active first.
pub async fn list_rooms(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Json<ApiEnvelope<Vec<Room>>>, ApiError> {
    let rooms = state.repository.rooms_for_user(session.id).await?;
    let meta = Meta {
        cursor: None,
        size: Some(rooms.len() as u32),
    };
    Ok(Json(ApiEnvelope::with_meta(rooms, meta)))
}

#[derive(Debug, Deserialize)]
pub struct OpenRoomInput {
    /// The other participant's username.
    pub username: String,
}

/// `POST /api/rooms` — open a private room with one peer, returning the
/// existing room when the pair already has one.
pub async fn open_room(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    Json(input): Json<OpenRoomInput>,
) -> Result<Json<ApiEnvelope<Room>>, ApiError> {
    let peer = state
        .repository
        .get_user_by_username(input.username.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no user named {:?}", input.username)))?;

    if peer.id == session.id {
        return Err(ApiError::Validation(
            "cannot open a room with yourself".into(),
        ));
    }

    if let Some(existing) = state
        .repository
        .find_private_room_between(session.id, peer.id)
        .await?
    {
        return Ok(Json(ApiEnvelope::success(existing)));
    }

    let room = state
        .repository
        .create_private_room(session.id, peer.id)
        .await?;
    info!(room_id = %room.id, "opened room between {} and {}", session.username, peer.username);

    Ok(Json(ApiEnvelope::success(room)))
}

/// `GET /api/rooms/{room_id}` — a single room, participants only.
pub async fn get_room(
    Path(room_id): Path<Uuid>,
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Json<ApiEnvelope<Room>>, ApiError> {
    let room = state
        .repository
        .get_room(room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("room not found".into()))?;

    if room.peer_of(session.id).is_none() {
        return Err(ApiError::Forbidden(
            "you are not a participant of this room".into(),
        ));
    }

    Ok(Json(ApiEnvelope::success(room)))
}
