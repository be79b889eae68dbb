//! Per-room WebSocket relay.
//!
//! - `channels` — per-room broadcast registry
//! - `handler` — upgrade endpoint + socket loop (parse, persist, fan out)

mod channels;
mod handler;

pub use channels::RoomChannels;
pub use handler::room_socket;
