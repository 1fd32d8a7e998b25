use rand::seq::IndexedRandom;
use sqlx::SqlitePool;

use uuid::Uuid;

use crate::db;

mod clients;
mod login;
mod lockin;
mod logout;
mod me;

pub use clients::{ClientProvider, Clients};
pub(crate) use login::login;
pub(crate) use lockin::lockin;
pub(crate) use logout::logout;
pub(crate) use me::me;

const ADJECTIVES: [&str; 25] = [
    "Quick", "Lazy", "Mysterious", "Jolly", "Brave", "Silent", "Witty", "Fierce",
    "Clever", "Gentle", "Wild", "Calm", "Bold", "Shy", "Proud", "Happy", "Sad",
    "Eager", "Fancy", "Rusty", "Golden", "Silver", "Bright", "Dark", "Lucky",
];

const NOUNS: [&str; 24] = [
    "Fox", "Bear", "Eagle", "Wolf", "Dragon", "Tiger", "Lion", "Owl", "Rabbit",
    "Falcon", "Hawk", "Shark", "Panda", "Kitten", "Puppy", "Phoenix", "Griffin",
    "Unicorn", "Turtle", "Dolphin", "Whale", "Elephant", "Giraffe", "Zebra",
];

fn random_alias() -> String {
    let mut rng = rand::rng();
    format!(
        "{} {}",
        ADJECTIVES.choose(&mut rng).copied().unwrap_or("Silent"),
        NOUNS.choose(&mut rng).copied().unwrap_or("Owl"),
    )
}

/// Where to send the browser after sign-in or sign-out. Only a path on this site passes;
/// anything else, including `//host` and `/\host`, falls back to `/`.
pub(crate) fn local_return_url(return_url: Option<String>) -> String {
    match return_url {
        Some(url) if is_local_path(&url) => url,
        _ => "/".to_owned(),
    }
}

fn is_local_path(url: &str) -> bool {
    url.starts_with('/')
        && !url.starts_with("//")
        && !url.chars().any(|c| c == '\\' || c.is_control())
}

/// Looks up the local user for an external account, creating one with a pseudonymous
/// alias on first sign-in. `provider_key` is `"{provider}:{external id}"`.
pub async fn find_or_create_user(db_pool: &SqlitePool, provider_key: &str) -> Result<Uuid, sqlx::Error> {
    let uuid = Uuid::now_v7();
    let alias = random_alias();

    let inserted = sqlx::query("INSERT INTO users (id,provider_key,alias,created_at) VALUES (?,?,?,?) ON CONFLICT(provider_key) DO NOTHING")
        .bind(uuid.to_string())
        .bind(provider_key)
        .bind(&alias)
        .bind(db::now_millis())
        .execute(db_pool)
        .await?
        .rows_affected();
    if inserted == 1 {
        tracing::info!(user_id = %uuid, %alias, "created user");
        return Ok(uuid);
    }

    let (user_id,): (String,) = sqlx::query_as("SELECT id FROM users WHERE provider_key=?")
        .bind(provider_key)
        .fetch_one(db_pool)
        .await?;
    Uuid::parse_str(&user_id).map_err(|err| sqlx::Error::Decode(Box::new(err)))
}
