use std::{collections::HashMap, sync::{Arc, Mutex, PoisonError}};

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::{self, Message, MessageRow}, realtime::Broadcaster, AppError, AppResult};

/// Persists room messages and hands each one to the [`Broadcaster`] once stored.
#[derive(Clone)]
pub struct MessageStore {
    db_pool: SqlitePool,
    broadcaster: Arc<Broadcaster>,
    append_locks: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl MessageStore {
    pub fn new(db_pool: SqlitePool, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            db_pool,
            broadcaster,
            append_locks: Arc::default(),
        }
    }

    /// Appends to the room's history and fans the stored message out.
    ///
    /// `seq` comes from the room's counter, so a number is never handed out twice even
    /// after deletes; `posted_at` never runs behind the room's newest message. The
    /// per-room lock is held until fan-out is done so subscribers see messages in `seq`
    /// order.
    pub async fn post_message(&self, room_id: Uuid, author_id: Uuid, body: &str) -> AppResult<Message> {
        if body.trim().is_empty() {
            return Err(AppError::Validation("message body cannot be empty".to_owned()));
        }

        let lock = self.append_lock(room_id);
        let _turn = lock.lock().await;

        let mut tx = self.db_pool.begin().await?;

        let seq: Option<i64> = sqlx::query_scalar("UPDATE rooms SET last_seq=last_seq+1 WHERE id=? RETURNING last_seq")
            .bind(room_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let seq = seq.ok_or(AppError::NotFound("room"))?;

        let id = Uuid::now_v7();
        let posted_at: i64 = sqlx::query_scalar(
            "INSERT INTO messages (id,room_id,author_id,body,posted_at,seq)
             SELECT ?,?,?,?,MAX(?, COALESCE(MAX(posted_at), 0)),?
             FROM messages WHERE room_id=?
             RETURNING posted_at",
        )
            .bind(id.to_string())
            .bind(room_id.to_string())
            .bind(author_id.to_string())
            .bind(body)
            .bind(db::now_millis())
            .bind(seq)
            .bind(room_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| AppError::missing_on_fk(err, "author"))?;

        tx.commit().await?;

        let message = Message {
            id,
            room_id,
            author_id,
            body: body.to_owned(),
            posted_at: db::from_millis(posted_at)?,
            seq,
        };

        let delivered = self.broadcaster.publish(&message);
        tracing::debug!(%room_id, message_id = %id, seq, delivered, "message posted");
        Ok(message)
    }

    /// Ascending by `(posted_at, seq)`.
    pub async fn list_messages(&self, room_id: Uuid) -> AppResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,room_id,author_id,body,posted_at,seq FROM messages WHERE room_id=? ORDER BY posted_at, seq",
        )
            .bind(room_id.to_string())
            .fetch_all(&self.db_pool)
            .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    pub async fn get_message(&self, message_id: Uuid) -> AppResult<Message> {
        let row: Option<MessageRow> = sqlx::query_as("SELECT id,room_id,author_id,body,posted_at,seq FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        row.ok_or(AppError::NotFound("message"))?.try_into()
    }

    pub async fn delete_message(&self, message_id: Uuid) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM messages WHERE id=?")
            .bind(message_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound("message"));
        }
        Ok(())
    }

    /// Drops the append lock of a deleted room.
    pub fn forget_room(&self, room_id: Uuid) {
        self.append_locks.lock().unwrap_or_else(PoisonError::into_inner).remove(&room_id);
    }

    fn append_lock(&self, room_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.append_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room_id)
            .or_default()
            .clone()
    }
}
