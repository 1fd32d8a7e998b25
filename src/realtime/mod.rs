//! Room-scoped realtime delivery over WebSockets.
//!
//! A [`Channel`] walks `Connected -> Joined(room) -> Disconnected`; the [`Broadcaster`]
//! keeps the joined channels of each room and fans stored messages out to them.

mod broadcaster;
mod channel;
mod events;
mod ws;

use axum::{routing::get, Router};

use crate::AppState;

pub use broadcaster::{outbox, Broadcaster, ChannelId, Inbox, Outbox, OUTBOX_CAPACITY};
pub use channel::{Channel, ChannelState};
pub use events::{ClientEvent, ServerEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::room_ws))
}
