#![allow(dead_code)]

use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use silentchoir::{auth, db, session::USER_ID, AppState};
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};
use uuid::Uuid;

pub const TEST_USER: &str = "x-test-user";

/// Signs the request in as the user named in `x-test-user`.
async fn sign_in_from_header(session: Session, request: Request, next: Next) -> Response {
    let user = request
        .headers()
        .get(TEST_USER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    if let Some(user) = user {
        session.insert(USER_ID, user).await.unwrap();
    }
    next.run(request).await
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let db_pool = db::connect("sqlite::memory:", 1).await.unwrap();
        let state = AppState::new(db_pool, auth::Clients::default());
        let router = silentchoir::app(state.clone())
            .layer(middleware::from_fn(sign_in_from_header))
            .layer(SessionManagerLayer::new(MemoryStore::default()));
        Self { state, router }
    }

    pub async fn user(&self, name: &str) -> Uuid {
        auth::find_or_create_user(&self.state.db_pool, &format!("test:{name}")).await.unwrap()
    }

    pub async fn admin(&self, name: &str) -> Uuid {
        let user_id = self.user(name).await;
        self.state.accounts.set_admin(user_id, true).await.unwrap();
        user_id
    }

    pub async fn call(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let body = body.map(|body| serde_json::to_string(&body).unwrap());
        self.call_raw(method, uri, user, body).await
    }

    /// Sends `body` as-is with a JSON content type. Non-JSON responses come back as a
    /// string value.
    pub async fn call_raw(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<String>) -> (StatusCode, Value) {
        let response = self.send(method, uri, user, body).await;
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    pub async fn send(&self, method: Method, uri: &str, user: Option<Uuid>, body: Option<String>) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(TEST_USER, user.to_string());
        }
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body)),
            None => request.body(Body::empty()),
        }
        .unwrap();

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, user, None).await
    }

    pub async fn post(&self, uri: &str, user: Option<Uuid>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, user, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user: Option<Uuid>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, user, None).await
    }
}
