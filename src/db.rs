use std::str::FromStr;

use serde::Serialize;
use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AppResult;

/// Opens the pool and applies pending migrations.
///
/// In-memory databases live as long as their connection, so idle reaping is turned off;
/// callers should use a single connection for `sqlite::memory:`.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    sqlx::migrate!().run(&db_pool).await?;
    Ok(db_pool)
}

pub(crate) fn now_millis() -> i64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
}

pub(crate) fn from_millis(millis: i64) -> AppResult<OffsetDateTime> {
    Ok(OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)?)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: Uuid,
    /// The alleged party this room is about.
    pub subject: String,
    pub participants: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub private: bool,
}

impl Room {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub room_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub posted_at: OffsetDateTime,
    /// Per-room insertion order; breaks `posted_at` ties.
    pub seq: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub alleged_party: String,
    pub reporter_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub alias: String,
    pub admin: bool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct MessageRow {
    pub id: String,
    pub room_id: String,
    pub author_id: String,
    pub body: String,
    pub posted_at: i64,
    pub seq: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = crate::AppError;

    fn try_from(row: MessageRow) -> AppResult<Self> {
        Ok(Message {
            id: Uuid::parse_str(&row.id)?,
            room_id: Uuid::parse_str(&row.room_id)?,
            author_id: Uuid::parse_str(&row.author_id)?,
            body: row.body,
            posted_at: from_millis(row.posted_at)?,
            seq: row.seq,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReportRow {
    pub id: String,
    pub alleged_party: String,
    pub reporter_id: String,
    pub created_at: i64,
}

impl TryFrom<ReportRow> for Report {
    type Error = crate::AppError;

    fn try_from(row: ReportRow) -> AppResult<Self> {
        Ok(Report {
            id: Uuid::parse_str(&row.id)?,
            alleged_party: row.alleged_party,
            reporter_id: Uuid::parse_str(&row.reporter_id)?,
            created_at: from_millis(row.created_at)?,
        })
    }
}
