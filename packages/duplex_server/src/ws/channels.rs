//! Per-room broadcast registry.
//!
//! Each active room gets one `tokio::sync::broadcast` channel; every socket
//! attached to the room subscribes to it. Channels are created lazily on
//! first subscribe and pruned once the last receiver hangs up.

use std::collections::HashMap;

use duplex_core::Message;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

pub struct RoomChannels {
    capacity: usize,
    inner: RwLock<HashMap<Uuid, broadcast::Sender<Message>>>,
}

impl RoomChannels {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribe to a room, creating its channel if this is the first
    /// listener.
    pub async fn subscribe(&self, room_id: Uuid) -> broadcast::Receiver<Message> {
        let mut inner = self.inner.write().await;
        inner
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver a message to every subscriber of the room — including the
    /// sender's own socket (the echo). Returns the number of receivers
    /// reached.
    pub async fn publish(&self, room_id: Uuid, message: Message) -> usize {
        let inner = self.inner.read().await;
        match inner.get(&room_id) {
            Some(sender) => sender.send(message).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the room's channel if nobody is listening anymore.
    pub async fn prune(&self, room_id: Uuid) {
        let mut inner = self.inner.write().await;
        if let Some(sender) = inner.get(&room_id)
            && sender.receiver_count() == 0
        {
            inner.remove(&room_id);
        }
    }

    #[cfg(test)]
    pub async fn active_rooms(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn make_msg(room_id: Uuid, body: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Uuid::new_v4(),
            body: body.to_string(),
            attachment: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let channels = RoomChannels::new(16);
        let room = Uuid::new_v4();
        let mut a = channels.subscribe(room).await;
        let mut b = channels.subscribe(room).await;

        let reached = channels.publish(room, make_msg(room, "hello")).await;
        assert_eq!(reached, 2);
        assert_eq!(a.recv().await.unwrap().body, "hello");
        assert_eq!(b.recv().await.unwrap().body, "hello");
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let channels = RoomChannels::new(16);
        let room_a = Uuid::new_v4();
        let room_b = Uuid::new_v4();
        let mut rx_a = channels.subscribe(room_a).await;
        let mut rx_b = channels.subscribe(room_b).await;

        channels.publish(room_a, make_msg(room_a, "only for a")).await;

        assert_eq!(rx_a.recv().await.unwrap().body, "only for a");
        // Nothing crossed over
        assert!(matches!(
            rx_b.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn publish_without_subscribers_reaches_nobody() {
        let channels = RoomChannels::new(16);
        let room = Uuid::new_v4();
        assert_eq!(channels.publish(room, make_msg(room, "void")).await, 0);
    }

    #[tokio::test]
    async fn prune_removes_abandoned_rooms() {
        let channels = RoomChannels::new(16);
        let room = Uuid::new_v4();

        let rx = channels.subscribe(room).await;
        assert_eq!(channels.active_rooms().await, 1);

        // Still listening: prune is a no-op
        channels.prune(room).await;
        assert_eq!(channels.active_rooms().await, 1);

        drop(rx);
        channels.prune(room).await;
        assert_eq!(channels.active_rooms().await, 0);
    }
}
