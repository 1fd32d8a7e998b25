use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// Who is behind a request or realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    User(Uuid),
    Anonymous,
}

impl Identity {
    pub async fn from_session(session: &Session) -> AppResult<Self> {
        let user_id = session.get::<String>(USER_ID).await?;
        Ok(match user_id.as_deref().map(Uuid::parse_str) {
            Some(Ok(user_id)) => Identity::User(user_id),
            _ => Identity::Anonymous,
        })
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Identity::User(user_id) => Some(*user_id),
            Identity::Anonymous => None,
        }
    }

    pub fn require_user(&self) -> AppResult<Uuid> {
        self.user_id().ok_or(AppError::Denied("sign in required"))
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| AppError::from(msg))?;
        Identity::from_session(&session).await
    }
}
