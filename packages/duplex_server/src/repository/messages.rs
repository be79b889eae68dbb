//! Message persistence and history retrieval.

use anyhow::{Context, Result};
use duplex_core::Message;
use sqlx::Row;
use uuid::Uuid;

use super::{ChatRepository, parse_id, parse_ts};

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    Ok(Message {
        id: parse_id(&row.get::<String, _>("id"))?,
        room_id: parse_id(&row.get::<String, _>("room_id"))?,
        sender_id: parse_id(&row.get::<String, _>("sender_id"))?,
        body: row.get("body"),
        attachment: row.get("attachment"),
        created_at: parse_ts(row.get("created_at"))?,
    })
}

impl ChatRepository {
    /// Persist a message and bump the room's activity timestamp.
    pub async fn insert_message(&self, msg: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, room_id, sender_id, body, attachment, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(msg.id.to_string())
        .bind(msg.room_id.to_string())
        .bind(msg.sender_id.to_string())
        .bind(&msg.body)
        .bind(&msg.attachment)
        .bind(msg.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert message")?;

        self.touch_room(msg.room_id).await
    }

    /// The newest `limit` messages of a room, returned oldest-first (natural
    /// reading order). Insertion order (`seq`) breaks timestamp ties.
    pub async fn room_history(&self, room_id: Uuid, limit: u32) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, room_id, sender_id, body, attachment, created_at
            FROM messages
            WHERE room_id = ?
            ORDER BY created_at DESC, seq DESC
            LIMIT ?
            "#,
        )
        .bind(room_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>>>()?;

        // Reverse so oldest is first
        messages.reverse();

        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers;
    use chrono::{Duration, Utc};

    async fn seed_room(repo: &ChatRepository) -> (Uuid, Uuid, Uuid) {
        let alice = repo
            .create_user("Alice", None, "alice", "alice@example.com", "s3cret!!")
            .await
            .unwrap()
            .id;
        let bob = repo
            .create_user("Bob", None, "bob", "bob@example.com", "s3cret!!")
            .await
            .unwrap()
            .id;
        let room = repo.create_private_room(alice, bob).await.unwrap();
        (room.id, alice, bob)
    }

    fn make_msg(room_id: Uuid, sender_id: Uuid, body: &str, offset_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id,
            body: body.to_string(),
            attachment: None,
            created_at: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn history_is_oldest_first() {
        let repo = test_helpers::test_repository().await;
        let (room, alice, bob) = seed_room(&repo).await;

        repo.insert_message(&make_msg(room, alice, "first", 0))
            .await
            .unwrap();
        repo.insert_message(&make_msg(room, bob, "second", 1))
            .await
            .unwrap();
        repo.insert_message(&make_msg(room, alice, "third", 2))
            .await
            .unwrap();

        let history = repo.room_history(room, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].body, "first");
        assert_eq!(history[2].body, "third");
    }

    #[tokio::test]
    async fn history_returns_newest_window() {
        let repo = test_helpers::test_repository().await;
        let (room, alice, _) = seed_room(&repo).await;

        for i in 0..5 {
            repo.insert_message(&make_msg(room, alice, &format!("msg {i}"), i))
                .await
                .unwrap();
        }

        let history = repo.room_history(room, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        // Newest two, still oldest-first
        assert_eq!(history[0].body, "msg 3");
        assert_eq!(history[1].body, "msg 4");
    }

    #[tokio::test]
    async fn empty_room_yields_empty_history() {
        let repo = test_helpers::test_repository().await;
        let (room, _, _) = seed_room(&repo).await;
        assert!(repo.room_history(room, 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rooms_do_not_leak_messages() {
        let repo = test_helpers::test_repository().await;
        let (room_ab, alice, bob) = seed_room(&repo).await;
        let carol = repo
            .create_user("Carol", None, "carol", "carol@example.com", "s3cret!!")
            .await
            .unwrap()
            .id;
        let room_ac = repo.create_private_room(alice, carol).await.unwrap().id;

        repo.insert_message(&make_msg(room_ab, bob, "for alice and bob", 0))
            .await
            .unwrap();
        repo.insert_message(&make_msg(room_ac, carol, "for alice and carol", 0))
            .await
            .unwrap();

        let ab = repo.room_history(room_ab, 20).await.unwrap();
        assert_eq!(ab.len(), 1);
        assert_eq!(ab[0].body, "for alice and bob");

        let ac = repo.room_history(room_ac, 20).await.unwrap();
        assert_eq!(ac.len(), 1);
        assert_eq!(ac[0].body, "for alice and carol");
    }

    #[tokio::test]
    async fn timestamp_ties_keep_insertion_order() {
        let repo = test_helpers::test_repository().await;
        let (room, alice, _) = seed_room(&repo).await;

        let at = Utc::now();
        for body in ["a", "b", "c"] {
            let mut msg = make_msg(room, alice, body, 0);
            msg.created_at = at;
            repo.insert_message(&msg).await.unwrap();
        }

        let history = repo.room_history(room, 10).await.unwrap();
        let bodies: Vec<_> = history.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn inserting_bumps_room_activity() {
        let repo = test_helpers::test_repository().await;
        let (room, alice, _) = seed_room(&repo).await;
        let before = repo.get_room(room).await.unwrap().unwrap().updated_at;

        repo.insert_message(&make_msg(room, alice, "ping", 1))
            .await
            .unwrap();

        let after = repo.get_room(room).await.unwrap().unwrap().updated_at;
        assert!(after > before);
    }
}
