//! Message history: the REST half of the conversation path.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use duplex_core::{ApiEnvelope, Message, Meta};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Hard ceiling regardless of what the client asks for.
const MAX_HISTORY_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
}

/// `GET /api/rooms/{room_id}/messages?limit=N` — the newest N messages,
/// oldest-first. An empty room is a success with empty data, not an error.
pub async fn room_history(
    Path(room_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Json<ApiEnvelope<Vec<Message>>>, ApiError> {
    if state.repository.get_room(room_id).await?.is_none() {
        return Err(ApiError::NotFound("room not found".into()));
    }
    if !state.repository.is_participant(room_id, session.id).await? {
        return Err(ApiError::Forbidden(
            "you are not a participant of this room".into(),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(state.config.server.history_page_size)
        .clamp(1, MAX_HISTORY_LIMIT);

    let messages = state.repository.room_history(room_id, limit).await?;
    let meta = Meta {
        cursor: query.cursor,
        size: Some(messages.len() as u32),
    };

    Ok(Json(ApiEnvelope::with_meta(messages, meta)))
}
