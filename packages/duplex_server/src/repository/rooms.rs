//! Rooms: two-participant conversation contexts. The participant set is
//! fixed at creation for private rooms.

use anyhow::{Context, Result};
use chrono::Utc;
use duplex_core::{Participant, Room, RoomType};
use sqlx::Row;
use uuid::Uuid;

use super::{ChatRepository, parse_id, parse_ts};

impl ChatRepository {
    /// Create a private room between two users. Callers are expected to have
    /// checked for an existing room first (`find_private_room_between`).
    pub async fn create_private_room(&self, user_a: Uuid, user_b: Uuid) -> Result<Room> {
        let room_id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO rooms (id, room_type, created_at, updated_at) VALUES (?, 'private', ?, ?)")
            .bind(room_id.to_string())
            .bind(now.timestamp_millis())
            .bind(now.timestamp_millis())
            .execute(&mut *tx)
            .await
            .context("Failed to insert room")?;

        for user_id in [user_a, user_b] {
            sqlx::query("INSERT INTO room_participants (room_id, user_id) VALUES (?, ?)")
                .bind(room_id.to_string())
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await
                .context("Failed to insert room participant")?;
        }
        tx.commit().await?;

        self.get_room(room_id)
            .await?
            .context("room disappeared after creation")
    }

    /// Find the existing private room shared by exactly these two users.
    pub async fn find_private_room_between(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<Room>> {
        let row = sqlx::query(
            r#"
            SELECT r.id
            FROM rooms r
            JOIN room_participants a ON a.room_id = r.id AND a.user_id = ?
            JOIN room_participants b ON b.room_id = r.id AND b.user_id = ?
            WHERE r.room_type = 'private'
            LIMIT 1
            "#,
        )
        .bind(user_a.to_string())
        .bind(user_b.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id = parse_id(&row.get::<String, _>("id"))?;
                self.get_room(id).await
            }
            None => Ok(None),
        }
    }

    pub async fn get_room(&self, room_id: Uuid) -> Result<Option<Room>> {
        let row = sqlx::query("SELECT id, room_type, created_at, updated_at FROM rooms WHERE id = ?")
            .bind(room_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let participants = self.room_participants(room_id).await?;
        Ok(Some(Room {
            id: parse_id(&row.get::<String, _>("id"))?,
            participants,
            room_type: RoomType::Private,
            created_at: parse_ts(row.get("created_at"))?,
            updated_at: parse_ts(row.get("updated_at"))?,
        }))
    }

    /// The inbox: rooms the user participates in, most recently active first.
    pub async fn rooms_for_user(&self, user_id: Uuid) -> Result<Vec<Room>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id
            FROM rooms r
            JOIN room_participants rp ON rp.room_id = r.id
            WHERE rp.user_id = ?
            ORDER BY r.updated_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut rooms = Vec::with_capacity(rows.len());
        for row in rows {
            let id = parse_id(&row.get::<String, _>("id"))?;
            if let Some(room) = self.get_room(id).await? {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    /// Bump the room's `updated_at` so the inbox sorts it first. Clamped to
    /// strictly increase even when two events land in the same millisecond.
    pub async fn touch_room(&self, room_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE rooms SET updated_at = MAX(?, updated_at + 1) WHERE id = ?")
            .bind(Utc::now().timestamp_millis())
            .bind(room_id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to touch room")?;
        Ok(())
    }

    pub async fn is_participant(&self, room_id: Uuid, user_id: Uuid) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM room_participants WHERE room_id = ? AND user_id = ?",
        )
        .bind(room_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn room_participants(&self, room_id: Uuid) -> Result<Vec<Participant>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.username, u.email
            FROM room_participants rp
            JOIN users u ON u.id = rp.user_id
            WHERE rp.room_id = ?
            ORDER BY u.username
            "#,
        )
        .bind(room_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(Participant {
                    id: parse_id(&row.get::<String, _>("id"))?,
                    username: row.get("username"),
                    email: row.get("email"),
                })
            })
            .collect()
    }
}
