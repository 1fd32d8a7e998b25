use axum::{debug_handler, extract::State};
use serde::Serialize;

use crate::{accounts::Accounts, db::{Room, User}, extract::Json, rooms::RoomDirectory, session::Identity, AppResult, AppState};

#[derive(Serialize)]
pub(crate) struct Me {
    user: User,
    rooms: Vec<Room>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn me(
    identity: Identity,
    State(accounts): State<Accounts>,
    State(directory): State<RoomDirectory>,
) -> AppResult<Json<Me>> {
    let user_id = identity.require_user()?;
    let user = accounts.get(user_id).await?;
    let rooms = directory.rooms_of(user_id).await?;
    Ok(Json(Me { user, rooms }))
}
