pub mod accounts;
pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
mod extract;
pub mod realtime;
pub mod reports;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use serde_json::Value;
use sqlx::SqlitePool;

pub use appresult::{AppError, AppResult};

use accounts::Accounts;
use realtime::Broadcaster;
use reports::Reports;
use rooms::{MembershipGuard, MessageStore, RoomDirectory};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub accounts: Accounts,
    pub directory: RoomDirectory,
    pub guard: MembershipGuard,
    pub messages: MessageStore,
    pub reports: Reports,
    pub broadcaster: Arc<Broadcaster>,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, clients: auth::Clients) -> Self {
        let broadcaster = Arc::new(Broadcaster::new());
        let directory = RoomDirectory::new(db_pool.clone());
        Self {
            accounts: Accounts::new(db_pool.clone()),
            guard: MembershipGuard::new(directory.clone()),
            messages: MessageStore::new(db_pool.clone(), broadcaster.clone()),
            reports: Reports::new(db_pool.clone(), directory.clone()),
            directory,
            broadcaster,
            clients,
            db_pool,
        }
    }

    /// Provider keys promoted to admin when they sign in.
    pub fn with_bootstrap_admins(mut self, provider_keys: Vec<String>) -> Self {
        self.accounts = self.accounts.with_bootstrap_admins(provider_keys);
        self
    }
}

/// Every route, without the session layer; callers wrap it in one.
pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/login/{provider}", get(auth::login))
        .route("/lockin/{provider}", get(auth::lockin))
        .route("/logout", get(auth::logout))
        .route("/me", get(auth::me))

        .nest("/accounts", accounts::router())
        .nest("/rooms", rooms::router())
        .nest("/reports", reports::router())
        .merge(realtime::router())

        .with_state(app_state)
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
    /// Accepts string or numeric ids; GitHub hands out numbers, Google strings.
    fn get_id_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }

    fn get_id_field(&self, field: &str) -> AppResult<String> {
        match self.get_obj_field(field)? {
            Value::Number(id) => Ok(id.to_string()),
            _ => self.get_str_field(field),
        }
    }
}
