use std::sync::Arc;

use axum::{debug_handler, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{accounts::Accounts, db::{Message, Room}, extract::{Json, Path}, realtime::Broadcaster, session::Identity, AppResult, AppState};

use super::{Action, MembershipGuard, MessageStore, RoomDirectory};

#[derive(Serialize)]
pub(crate) struct RoomView {
    room: Room,
    messages: Vec<Message>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_rooms(
    identity: Identity,
    State(directory): State<RoomDirectory>,
) -> AppResult<Json<Vec<Room>>> {
    identity.require_user()?;
    Ok(Json(directory.list_rooms().await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    identity: Identity,
    State(directory): State<RoomDirectory>,
    State(guard): State<MembershipGuard>,
    State(messages): State<MessageStore>,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<RoomView>> {
    guard.require(identity, room_id, Action::Read).await?;

    let room = directory.get_room(room_id).await?;
    let messages = messages.list_messages(room_id).await?;
    Ok(Json(RoomView { room, messages }))
}

/// Admin only. Joined channels are evicted.
#[debug_handler(state = AppState)]
pub(crate) async fn delete_room(
    identity: Identity,
    State(accounts): State<Accounts>,
    State(directory): State<RoomDirectory>,
    State(messages): State<MessageStore>,
    State(broadcaster): State<Arc<Broadcaster>>,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    accounts.require_admin(identity).await?;
    directory.delete_room(room_id).await?;

    broadcaster.close_room(room_id, "room deleted");
    messages.forget_room(room_id);
    Ok(Json(json!({ "message": "Room deleted successfully." })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InviteQuery {
    user_id: Uuid,
}

#[debug_handler(state = AppState)]
pub(crate) async fn invite(
    identity: Identity,
    State(directory): State<RoomDirectory>,
    State(guard): State<MembershipGuard>,
    Path(room_id): Path<Uuid>,

    Json(InviteQuery { user_id }): Json<InviteQuery>,
) -> AppResult<Json<Room>> {
    guard.require(identity, room_id, Action::Write).await?;
    Ok(Json(directory.add_participant(room_id, user_id).await?))
}
