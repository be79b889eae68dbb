//! Shared types between the duplex client and server: domain models, the
//! REST response envelope, WebSocket frame types, and credential decoding.
//! No I/O lives here.

pub mod models;
pub mod protocol;
pub mod session;

pub use models::{Message, Participant, Room, RoomType};
pub use protocol::{ApiEnvelope, ApiErrorBody, ApiStatus, Meta, OutboundFrame};
pub use session::{Credential, Session, SessionDecodeError};
