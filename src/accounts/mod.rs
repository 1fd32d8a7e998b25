mod account;

use std::{collections::HashSet, sync::Arc};

use axum::{routing::{get, post}, Router};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{auth::find_or_create_user, db::User, session::Identity, AppError, AppResult, AppState};

type UserRow = (String, String, bool);

/// User accounts and their admin flag.
#[derive(Clone)]
pub struct Accounts {
    db_pool: SqlitePool,
    bootstrap_admins: Arc<HashSet<String>>,
}

impl Accounts {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self {
            db_pool,
            bootstrap_admins: Arc::default(),
        }
    }

    /// Provider keys that are made admins on sign-in.
    pub fn with_bootstrap_admins(mut self, provider_keys: impl IntoIterator<Item = String>) -> Self {
        self.bootstrap_admins = Arc::new(provider_keys.into_iter().collect());
        self
    }

    /// Resolves a signed-in external account to its local user.
    pub async fn signed_in(&self, provider_key: &str) -> AppResult<Uuid> {
        let user_id = find_or_create_user(&self.db_pool, provider_key).await?;
        if self.bootstrap_admins.contains(provider_key) {
            self.set_admin(user_id, true).await?;
        }
        Ok(user_id)
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        let row: Option<UserRow> = sqlx::query_as("SELECT id,alias,admin FROM users WHERE id=?")
            .bind(user_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        user(row.ok_or(AppError::NotFound("user"))?)
    }

    /// Oldest first.
    pub async fn list(&self) -> AppResult<Vec<User>> {
        let rows: Vec<UserRow> = sqlx::query_as("SELECT id,alias,admin FROM users ORDER BY created_at, rowid")
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter().map(user).collect()
    }

    pub async fn set_admin(&self, user_id: Uuid, admin: bool) -> AppResult<User> {
        let updated = sqlx::query("UPDATE users SET admin=? WHERE id=?")
            .bind(admin)
            .bind(user_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound("user"));
        }
        tracing::info!(%user_id, admin, "admin rights changed");
        self.get(user_id).await
    }

    pub async fn is_admin(&self, user_id: Uuid) -> AppResult<bool> {
        let admin: Option<bool> = sqlx::query_scalar("SELECT admin FROM users WHERE id=?")
            .bind(user_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(admin.unwrap_or(false))
    }

    pub async fn require_admin(&self, identity: Identity) -> AppResult<Uuid> {
        let user_id = identity.require_user()?;
        if !self.is_admin(user_id).await? {
            return Err(AppError::Denied("admin rights required"));
        }
        Ok(user_id)
    }
}

fn user((id, alias, admin): UserRow) -> AppResult<User> {
    Ok(User { id: Uuid::parse_str(&id)?, alias, admin })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(account::list_accounts))
        .route("/{account_id}", get(account::account))
        .route("/{account_id}/admin", post(account::grant_admin))
        .route("/{account_id}/revoke", post(account::revoke_admin))
}
