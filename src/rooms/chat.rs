use axum::{debug_handler, extract::State};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{db::Message, extract::{Json, Path}, session::Identity, AppError, AppResult, AppState};

use super::{Action, MembershipGuard, MessageStore};

#[derive(Deserialize)]
pub(crate) struct SendMessageQuery {
    text: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    identity: Identity,
    State(guard): State<MembershipGuard>,
    State(messages): State<MessageStore>,
    Path(room_id): Path<Uuid>,

    Json(SendMessageQuery { text }): Json<SendMessageQuery>,
) -> AppResult<Json<Message>> {
    let author_id = guard.require(identity, room_id, Action::Write).await?;
    Ok(Json(messages.post_message(room_id, author_id, &text).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_messages(
    identity: Identity,
    State(guard): State<MembershipGuard>,
    State(messages): State<MessageStore>,
    Path(room_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    guard.require(identity, room_id, Action::Read).await?;
    Ok(Json(messages.list_messages(room_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_message(
    identity: Identity,
    State(guard): State<MembershipGuard>,
    State(messages): State<MessageStore>,
    Path((room_id, message_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<Value>> {
    let user_id = guard.require(identity, room_id, Action::Write).await?;

    let message = messages.get_message(message_id).await?;
    if message.room_id != room_id {
        return Err(AppError::NotFound("message"));
    }
    if message.author_id != user_id {
        return Err(AppError::Denied("only the author may delete a message"));
    }

    messages.delete_message(message_id).await?;
    Ok(Json(json!({ "message": "Message deleted successfully." })))
}
