use uuid::Uuid;

use crate::{session::Identity, AppError, AppResult};

use super::RoomDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Denied,
}

/// Participants may read and write; nobody else may do either.
#[derive(Clone)]
pub struct MembershipGuard {
    directory: RoomDirectory,
}

impl MembershipGuard {
    pub fn new(directory: RoomDirectory) -> Self {
        Self { directory }
    }

    /// `Err(NotFound)` for an unknown room, so callers can tell it apart from `Denied`.
    pub async fn authorize(&self, identity: Identity, room_id: Uuid, action: Action) -> AppResult<Access> {
        let Some(user_id) = identity.user_id() else {
            return match self.directory.room_exists(room_id).await? {
                true => Ok(Access::Denied),
                false => Err(AppError::NotFound("room")),
            };
        };

        let access = match self.directory.is_participant(room_id, user_id).await? {
            Some(true) => Access::Allowed,
            Some(false) => Access::Denied,
            None => return Err(AppError::NotFound("room")),
        };
        tracing::trace!(%room_id, %user_id, ?action, ?access, "authorized");
        Ok(access)
    }

    /// Like [`authorize`](Self::authorize) but folds `Denied` into the error path.
    pub async fn require(&self, identity: Identity, room_id: Uuid, action: Action) -> AppResult<Uuid> {
        match self.authorize(identity, room_id, action).await? {
            Access::Allowed => identity.require_user(),
            Access::Denied => Err(AppError::Denied("not a participant of this room")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::find_or_create_user, db::test_support::memory_pool};

    #[tokio::test]
    async fn only_participants_are_allowed() {
        let db_pool = memory_pool().await;
        let u1 = find_or_create_user(&db_pool, "test:u1").await.unwrap();
        let u2 = find_or_create_user(&db_pool, "test:u2").await.unwrap();
        let directory = RoomDirectory::new(db_pool);
        let guard = MembershipGuard::new(directory.clone());
        let room = directory.create_room("Alice vs Bob", u1).await.unwrap();

        for action in [Action::Read, Action::Write] {
            assert_eq!(guard.authorize(Identity::User(u1), room.id, action).await.unwrap(), Access::Allowed);
            assert_eq!(guard.authorize(Identity::User(u2), room.id, action).await.unwrap(), Access::Denied);
            assert_eq!(guard.authorize(Identity::Anonymous, room.id, action).await.unwrap(), Access::Denied);
        }

        assert_eq!(guard.require(Identity::User(u1), room.id, Action::Write).await.unwrap(), u1);
        assert!(matches!(guard.require(Identity::User(u2), room.id, Action::Write).await, Err(AppError::Denied(_))));
    }

    #[tokio::test]
    async fn unknown_room_is_not_found_rather_than_denied() {
        let db_pool = memory_pool().await;
        let u1 = find_or_create_user(&db_pool, "test:u1").await.unwrap();
        let guard = MembershipGuard::new(RoomDirectory::new(db_pool));
        let missing = Uuid::now_v7();

        assert!(matches!(guard.authorize(Identity::User(u1), missing, Action::Read).await, Err(AppError::NotFound("room"))));
        assert!(matches!(guard.authorize(Identity::Anonymous, missing, Action::Write).await, Err(AppError::NotFound("room"))));
    }
}
