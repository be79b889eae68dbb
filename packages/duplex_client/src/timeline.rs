//! The ordered, deduplicated in-memory message list for the active room.
//!
//! Canonical order is oldest-first by `created_at`, ties keeping arrival
//! order. Appending an id that is already present replaces the existing
//! entry (later fields win), so a server echo reconciles cleanly with any
//! earlier copy of the same message.

use duplex_core::Message;
use tracing::warn;
use uuid::Uuid;

pub struct MessageTimeline {
    room_id: Uuid,
    entries: Vec<Message>,
}

impl MessageTimeline {
    pub fn new(room_id: Uuid) -> Self {
        Self {
            room_id,
            entries: Vec::new(),
        }
    }

    pub fn room_id(&self) -> Uuid {
        self.room_id
    }

    /// Replace the timeline with fetched history, sorted oldest-first.
    /// The sort is stable, so equal timestamps keep their fetched order.
    pub fn seed(&mut self, history: Vec<Message>) {
        let mut entries: Vec<Message> = history
            .into_iter()
            .filter(|message| self.belongs_here(message))
            .collect();
        entries.sort_by_key(|message| message.created_at);
        self.entries = entries;
    }

    /// Insert a newly arrived message at its timestamp position. A message
    /// whose id is already present replaces the old entry instead of
    /// duplicating it.
    pub fn append(&mut self, message: Message) {
        if !self.belongs_here(&message) {
            return;
        }
        if let Some(pos) = self.entries.iter().position(|m| m.id == message.id) {
            self.entries.remove(pos);
        }
        // Insert after any entry with an equal timestamp: arrival order
        // breaks ties.
        let idx = self
            .entries
            .partition_point(|m| m.created_at <= message.created_at);
        self.entries.insert(idx, message);
    }

    /// Presentation order: newest-first (the rendered list stacks from the
    /// bottom). Restartable — iterate as often as needed.
    pub fn view(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().rev()
    }

    /// Canonical order: oldest-first.
    pub fn iter(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discard all contents (leaving a room keeps nothing around).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn belongs_here(&self, message: &Message) -> bool {
        if message.room_id == self.room_id {
            true
        } else {
            warn!(
                timeline = %self.room_id,
                message = %message.id,
                "discarding message addressed to another room"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn base_time() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap()
    }

    fn msg(room_id: Uuid, body: &str, offset_secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            room_id,
            sender_id: Uuid::new_v4(),
            body: body.to_string(),
            attachment: None,
            created_at: base_time() + Duration::seconds(offset_secs),
        }
    }

    fn bodies_oldest_first(timeline: &MessageTimeline) -> Vec<String> {
        timeline.iter().map(|m| m.body.clone()).collect()
    }

    #[test]
    fn seed_sorts_oldest_first_regardless_of_input_order() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![
            msg(room, "third", 30),
            msg(room, "first", 10),
            msg(room, "second", 20),
        ]);

        assert_eq!(
            bodies_oldest_first(&timeline),
            vec!["first", "second", "third"]
        );

        // Non-decreasing timestamps in canonical order
        let stamps: Vec<_> = timeline.iter().map(|m| m.created_at).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn seed_replaces_previous_contents() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![msg(room, "old", 0)]);
        timeline.seed(vec![msg(room, "new", 5)]);
        assert_eq!(bodies_oldest_first(&timeline), vec!["new"]);
    }

    #[test]
    fn seed_ties_keep_fetched_order() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![
            msg(room, "a", 0),
            msg(room, "b", 0),
            msg(room, "c", 0),
        ]);
        assert_eq!(bodies_oldest_first(&timeline), vec!["a", "b", "c"]);
    }

    #[test]
    fn history_then_live_append_reads_in_order() {
        // Room history returns m1; the socket later delivers m2 with a
        // newer timestamp; oldest-first must read [m1, m2].
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![msg(room, "Hello, how are you?", 0)]);
        timeline.append(msg(room, "I'm good", 10));

        assert_eq!(
            bodies_oldest_first(&timeline),
            vec!["Hello, how are you?", "I'm good"]
        );
    }

    #[test]
    fn append_out_of_order_lands_at_timestamp_position() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![msg(room, "early", 0), msg(room, "late", 20)]);
        timeline.append(msg(room, "middle", 10));

        assert_eq!(
            bodies_oldest_first(&timeline),
            vec!["early", "middle", "late"]
        );
    }

    #[test]
    fn append_same_id_replaces_with_later_fields() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);

        let mut original = msg(room, "pending...", 0);
        timeline.seed(vec![original.clone()]);

        original.body = "confirmed".to_string();
        timeline.append(original.clone());
        timeline.append(original);

        assert_eq!(timeline.len(), 1);
        assert_eq!(bodies_oldest_first(&timeline), vec!["confirmed"]);
    }

    #[test]
    fn view_is_newest_first_and_restartable() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![msg(room, "first", 0), msg(room, "second", 10)]);

        let newest: Vec<_> = timeline.view().map(|m| m.body.as_str()).collect();
        assert_eq!(newest, vec!["second", "first"]);

        // A second pass yields the same thing
        let again: Vec<_> = timeline.view().map(|m| m.body.as_str()).collect();
        assert_eq!(again, newest);
    }

    #[test]
    fn other_rooms_never_leak_in() {
        let room_b = Uuid::new_v4();
        let room_a = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room_b);

        timeline.seed(vec![msg(room_b, "b message", 0), msg(room_a, "a leftover", 0)]);
        timeline.append(msg(room_a, "a straggler", 10));

        assert_eq!(bodies_oldest_first(&timeline), vec!["b message"]);
    }

    #[test]
    fn clear_discards_everything() {
        let room = Uuid::new_v4();
        let mut timeline = MessageTimeline::new(room);
        timeline.seed(vec![msg(room, "x", 0)]);
        timeline.clear();
        assert!(timeline.is_empty());
        assert_eq!(timeline.view().count(), 0);
    }
}
