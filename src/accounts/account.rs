use axum::{debug_handler, extract::State};
use uuid::Uuid;

use crate::{db::User, extract::{Json, Path}, session::Identity, AppError, AppResult, AppState};

use super::Accounts;

#[debug_handler(state = AppState)]
pub(crate) async fn list_accounts(
    identity: Identity,
    State(accounts): State<Accounts>,
) -> AppResult<Json<Vec<User>>> {
    accounts.require_admin(identity).await?;
    Ok(Json(accounts.list().await?))
}

/// Admins may look at anyone; everyone else only at themselves.
#[debug_handler(state = AppState)]
pub(crate) async fn account(
    identity: Identity,
    State(accounts): State<Accounts>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    let user_id = identity.require_user()?;
    if user_id != account_id && !accounts.is_admin(user_id).await? {
        return Err(AppError::Denied("admin rights required"));
    }
    Ok(Json(accounts.get(account_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn grant_admin(
    identity: Identity,
    State(accounts): State<Accounts>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    accounts.require_admin(identity).await?;
    Ok(Json(accounts.set_admin(account_id, true).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn revoke_admin(
    identity: Identity,
    State(accounts): State<Accounts>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    accounts.require_admin(identity).await?;
    Ok(Json(accounts.set_admin(account_id, false).await?))
}
