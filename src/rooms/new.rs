use axum::{debug_handler, extract::State};
use serde::Deserialize;

use crate::{db::Room, extract::Json, session::Identity, AppResult, AppState};

use super::RoomDirectory;

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    subject: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    identity: Identity,
    State(directory): State<RoomDirectory>,

    Json(NewRoomQuery { subject }): Json<NewRoomQuery>,
) -> AppResult<Json<Room>> {
    let user_id = identity.require_user()?;
    Ok(Json(directory.create_room(&subject, user_id).await?))
}
