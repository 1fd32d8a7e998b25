use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::{db::{self, Room}, AppError, AppResult};

/// Owns room records and their participant sets.
#[derive(Clone)]
pub struct RoomDirectory {
    db_pool: SqlitePool,
}

type RoomRow = (String, String, bool, i64);

impl RoomDirectory {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Lookup-or-create keyed on `subject`. The initiator ends up a participant either way.
    pub async fn create_room(&self, subject: &str, initiator_id: Uuid) -> AppResult<Room> {
        let mut tx = self.db_pool.begin().await?;
        let room_id = Self::open_room(&mut tx, subject, initiator_id).await?;
        tx.commit().await?;
        self.get_room(room_id).await
    }

    /// [`create_room`](Self::create_room) on a caller's connection, so the room can
    /// commit together with whatever prompted it.
    pub(crate) async fn open_room(conn: &mut SqliteConnection, subject: &str, initiator_id: Uuid) -> AppResult<Uuid> {
        let subject = subject.trim();
        if subject.is_empty() {
            return Err(AppError::Validation("subject cannot be blank".to_owned()));
        }

        let now = db::now_millis();
        let created = sqlx::query("INSERT INTO rooms (id,subject,private,created_at) VALUES (?,?,0,?) ON CONFLICT(subject) DO NOTHING")
            .bind(Uuid::now_v7().to_string())
            .bind(subject)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .rows_affected() == 1;

        let (room_id,): (String,) = sqlx::query_as("SELECT id FROM rooms WHERE subject=?")
            .bind(subject)
            .fetch_one(&mut *conn)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO room_participants (room_id,user_id,joined_at) VALUES (?,?,?)")
            .bind(&room_id)
            .bind(initiator_id.to_string())
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|err| AppError::missing_on_fk(err, "user"))?;

        if created {
            tracing::info!(%room_id, %subject, initiator = %initiator_id, "room created");
        }
        Ok(Uuid::parse_str(&room_id)?)
    }

    pub async fn get_room(&self, room_id: Uuid) -> AppResult<Room> {
        let row: Option<RoomRow> = sqlx::query_as("SELECT id,subject,private,created_at FROM rooms WHERE id=?")
            .bind(room_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        let Some(row) = row else {
            return Err(AppError::NotFound("room"));
        };
        self.assemble(row).await
    }

    /// Newest first.
    pub async fn list_rooms(&self) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as("SELECT id,subject,private,created_at FROM rooms ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.db_pool)
            .await?;
        self.assemble_all(rows).await
    }

    /// Rooms `user_id` participates in, newest first.
    pub async fn rooms_of(&self, user_id: Uuid) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            "SELECT r.id,r.subject,r.private,r.created_at FROM rooms r
             JOIN room_participants p ON p.room_id = r.id
             WHERE p.user_id=? ORDER BY r.created_at DESC, r.rowid DESC",
        )
            .bind(user_id.to_string())
            .fetch_all(&self.db_pool)
            .await?;
        self.assemble_all(rows).await
    }

    /// Participants and messages go with the room.
    pub async fn delete_room(&self, room_id: Uuid) -> AppResult<()> {
        let deleted = sqlx::query("DELETE FROM rooms WHERE id=?")
            .bind(room_id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound("room"));
        }
        tracing::info!(%room_id, "room deleted");
        Ok(())
    }

    /// Explicit invitation. Adding an existing participant is a no-op.
    pub async fn add_participant(&self, room_id: Uuid, user_id: Uuid) -> AppResult<Room> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO room_participants (room_id,user_id,joined_at)
             SELECT id,?,? FROM rooms WHERE id=?",
        )
            .bind(user_id.to_string())
            .bind(db::now_millis())
            .bind(room_id.to_string())
            .execute(&self.db_pool)
            .await
            .map_err(|err| AppError::missing_on_fk(err, "user"))?;

        let room = self.get_room(room_id).await?;
        if result.rows_affected() == 1 {
            tracing::info!(%room_id, %user_id, "participant added");
        }
        Ok(room)
    }

    /// `None` when the room does not exist.
    pub async fn is_participant(&self, room_id: Uuid, user_id: Uuid) -> AppResult<Option<bool>> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM room_participants WHERE room_id=rooms.id AND user_id=?) FROM rooms WHERE id=?",
        )
            .bind(user_id.to_string())
            .bind(room_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.map(|(member,)| member))
    }

    pub async fn room_exists(&self, room_id: Uuid) -> AppResult<bool> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM rooms WHERE id=?)")
            .bind(room_id.to_string())
            .fetch_one(&self.db_pool)
            .await?;
        Ok(exists)
    }

    async fn assemble_all(&self, rows: Vec<RoomRow>) -> AppResult<Vec<Room>> {
        let mut rooms = Vec::with_capacity(rows.len());
        for row in rows {
            rooms.push(self.assemble(row).await?);
        }
        Ok(rooms)
    }

    async fn assemble(&self, (id, subject, private, created_at): RoomRow) -> AppResult<Room> {
        let participants: Vec<(String,)> = sqlx::query_as("SELECT user_id FROM room_participants WHERE room_id=? ORDER BY joined_at, rowid")
            .bind(&id)
            .fetch_all(&self.db_pool)
            .await?;

        Ok(Room {
            id: Uuid::parse_str(&id)?,
            subject,
            participants: participants
                .iter()
                .map(|(user_id,)| Uuid::parse_str(user_id))
                .collect::<Result<_, _>>()?,
            created_at: db::from_millis(created_at)?,
            private,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::find_or_create_user, db::test_support::memory_pool};

    async fn setup() -> (RoomDirectory, Uuid, Uuid) {
        let db_pool = memory_pool().await;
        let u1 = find_or_create_user(&db_pool, "test:u1").await.unwrap();
        let u2 = find_or_create_user(&db_pool, "test:u2").await.unwrap();
        (RoomDirectory::new(db_pool), u1, u2)
    }

    #[tokio::test]
    async fn create_room_starts_with_initiator() {
        let (directory, u1, _) = setup().await;
        let room = directory.create_room("Alice vs Bob", u1).await.unwrap();
        assert_eq!(room.subject, "Alice vs Bob");
        assert_eq!(room.participants, vec![u1]);
        assert!(!room.private);
    }

    #[tokio::test]
    async fn create_room_is_lookup_or_create_by_subject() {
        let (directory, u1, u2) = setup().await;
        let first = directory.create_room("Alice vs Bob", u1).await.unwrap();
        let again = directory.create_room("  Alice vs Bob ", u1).await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.participants, vec![u1]);

        let joined = directory.create_room("Alice vs Bob", u2).await.unwrap();
        assert_eq!(joined.id, first.id);
        assert_eq!(joined.participants, vec![u1, u2]);
        assert_eq!(directory.list_rooms().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_subject_is_rejected() {
        let (directory, u1, _) = setup().await;
        assert!(matches!(directory.create_room("   ", u1).await, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let (directory, _, _) = setup().await;
        let missing = Uuid::now_v7();
        assert!(matches!(directory.get_room(missing).await, Err(AppError::NotFound("room"))));
        assert!(matches!(directory.delete_room(missing).await, Err(AppError::NotFound("room"))));
        assert!(matches!(directory.add_participant(missing, Uuid::now_v7()).await, Err(AppError::NotFound(_))));
        assert_eq!(directory.is_participant(missing, Uuid::now_v7()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_rooms_is_newest_first() {
        let (directory, u1, _) = setup().await;
        let older = directory.create_room("first", u1).await.unwrap();
        let newer = directory.create_room("second", u1).await.unwrap();
        let ids: Vec<_> = directory.list_rooms().await.unwrap().into_iter().map(|room| room.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn invitation_adds_participant_once() {
        let (directory, u1, u2) = setup().await;
        let room = directory.create_room("Alice vs Bob", u1).await.unwrap();
        assert_eq!(directory.is_participant(room.id, u2).await.unwrap(), Some(false));

        directory.add_participant(room.id, u2).await.unwrap();
        let room = directory.add_participant(room.id, u2).await.unwrap();
        assert_eq!(room.participants, vec![u1, u2]);
        assert_eq!(directory.is_participant(room.id, u2).await.unwrap(), Some(true));
        assert_eq!(directory.rooms_of(u2).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn inviting_unknown_user_is_not_found() {
        let (directory, u1, _) = setup().await;
        let room = directory.create_room("Alice vs Bob", u1).await.unwrap();
        assert!(matches!(directory.add_participant(room.id, Uuid::now_v7()).await, Err(AppError::NotFound("user"))));
    }

    #[tokio::test]
    async fn delete_room_removes_it() {
        let (directory, u1, _) = setup().await;
        let room = directory.create_room("Alice vs Bob", u1).await.unwrap();
        directory.delete_room(room.id).await.unwrap();
        assert!(matches!(directory.get_room(room.id).await, Err(AppError::NotFound(_))));
        assert!(directory.rooms_of(u1).await.unwrap().is_empty());
    }
}
