// Repository layer — each domain lives in its own file with `impl ChatRepository`.
//
// Timestamps are stored as unix milliseconds, ids as hyphenated UUID text.
// The messaging core never sees SQL; everything goes through this layer.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use uuid::Uuid;

mod messages;
mod rooms;
mod users;

pub use users::ProfileChanges;

#[cfg(test)]
pub(crate) mod test_helpers;

#[derive(Clone)]
pub struct ChatRepository {
    pub(crate) pool: SqlitePool,
}

impl ChatRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse()
        .map_err(|e| anyhow!("invalid uuid in database ({raw}): {e}"))
}

pub(crate) fn parse_ts(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| anyhow!("invalid timestamp in database: {millis}"))
}
