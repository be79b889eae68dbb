//! The duplex conversation client: the real-time messaging path behind the
//! terminal front end.
//!
//! - `history` — REST retrieval of the newest messages for a room
//! - `socket` — one live WebSocket connection per active room
//! - `timeline` — the ordered, deduplicated in-memory message list
//! - `controller` — room lifecycle: enter → fetch + connect → relay → teardown
//!
//! Identity is threaded explicitly: callers hand the controller a
//! `Credential` and everything downstream receives it as a value.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod socket;
pub mod timeline;

pub use config::{ClientConfig, ReconnectPolicy};
pub use controller::{Conversation, ConversationController, ConversationEvent};
pub use error::ClientError;
pub use history::{DEFAULT_HISTORY_LIMIT, HistoryFetcher};
pub use socket::{ConnectionState, RoomSocket};
pub use timeline::MessageTimeline;
