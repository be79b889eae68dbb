mod auth;
mod health;
mod messages;
mod rooms;
mod users;

pub use auth::{login, register};
pub use health::health_handler;
pub use messages::room_history;
pub use rooms::{get_room, list_rooms, open_room};
pub use users::update_profile;
