//! Domain models shared across the wire.
//!
//! All types serialize camelCase; timestamps are RFC 3339 UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message. Immutable once created; `created_at` is the ordering key,
/// ties broken by insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A user as seen by other participants of a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    /// Exactly two participants, fixed at creation.
    Private,
}

/// A conversation context between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    pub participants: Vec<Participant>,
    pub room_type: RoomType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Room {
    /// The participant that is not `user_id` — the display identity for the
    /// conversation. `None` if `user_id` is not a participant or the room is
    /// malformed.
    pub fn peer_of(&self, user_id: Uuid) -> Option<&Participant> {
        if !self.participants.iter().any(|p| p.id == user_id) {
            return None;
        }
        self.participants.iter().find(|p| p.id != user_id)
    }

    /// Look up a participant's username by id (e.g. to label a message).
    pub fn username_of(&self, user_id: Uuid) -> Option<&str> {
        self.participants
            .iter()
            .find(|p| p.id == user_id)
            .map(|p| p.username.as_str())
    }
}
