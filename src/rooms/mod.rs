mod directory;
mod guard;
mod msg;
mod new;
mod chat;
mod room;

use axum::{routing::{delete, get, post}, Router};

use crate::AppState;

pub use directory::RoomDirectory;
pub use guard::{Access, Action, MembershipGuard};
pub use msg::MessageStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(room::list_rooms).post(new::new_room))
        .route("/{room_id}", get(room::room).delete(room::delete_room))
        .route("/{room_id}/participants", post(room::invite))
        .route("/{room_id}/messages", get(chat::list_messages).post(chat::post_message))
        .route("/{room_id}/messages/{message_id}", delete(chat::delete_message))
}
