use std::sync::Arc;

use uuid::Uuid;

use crate::{rooms::{Access, Action, MembershipGuard, MessageStore}, session::Identity, AppError, AppResult};

use super::{broadcaster::{ChannelId, Outbox}, Broadcaster, ClientEvent, ServerEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connected,
    Joined(Uuid),
    Disconnected,
}

/// One realtime connection. Every reply, and every fanned-out message, goes through
/// `outbox` so the client sees them in a single order.
pub struct Channel {
    id: ChannelId,
    identity: Identity,
    state: ChannelState,
    outbox: Outbox,
    guard: MembershipGuard,
    messages: MessageStore,
    broadcaster: Arc<Broadcaster>,
}

impl Channel {
    pub fn new(
        identity: Identity,
        outbox: Outbox,
        guard: MembershipGuard,
        messages: MessageStore,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            identity,
            state: ChannelState::Connected,
            outbox,
            guard,
            messages,
            broadcaster,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Handles one client event. Failures become a `denied` notice; storage failures are
    /// logged as well.
    pub async fn handle(&mut self, event: ClientEvent) {
        if self.state == ChannelState::Disconnected {
            return;
        }
        if let Err(err) = self.try_handle(event).await {
            if err.status().is_server_error() {
                err.log();
            }
            self.notify(ServerEvent::denied(err.reason()));
        }
    }

    pub fn reject_malformed(&self, err: &serde_json::Error) {
        tracing::debug!(channel_id = %self.id, error = %err, "malformed client event");
        self.notify(ServerEvent::denied(format!("malformed event: {err}")));
    }

    async fn try_handle(&mut self, event: ClientEvent) -> AppResult<()> {
        match event {
            ClientEvent::Join { room_id } => self.join(room_id).await,
            ClientEvent::Leave => {
                self.leave();
                Ok(())
            }
            ClientEvent::Post { room_id, text } => self.post(room_id, &text).await,
        }
    }

    async fn join(&mut self, room_id: Uuid) -> AppResult<()> {
        match self.guard.authorize(self.identity, room_id, Action::Read).await? {
            Access::Allowed => {}
            Access::Denied => return Err(AppError::Denied("not a participant of this room")),
        }

        if self.state == ChannelState::Joined(room_id) {
            self.notify(ServerEvent::Joined { room_id });
            return Ok(());
        }
        // refused when the room was deleted after the membership check
        if !self.broadcaster.join(room_id, self.id, self.outbox.clone()) {
            return Err(AppError::NotFound("room"));
        }
        self.leave();
        self.state = ChannelState::Joined(room_id);
        self.notify(ServerEvent::Joined { room_id });
        Ok(())
    }

    fn leave(&mut self) {
        if let ChannelState::Joined(room_id) = self.state {
            self.broadcaster.leave(room_id, self.id);
            self.state = ChannelState::Connected;
        }
    }

    async fn post(&mut self, room_id: Uuid, text: &str) -> AppResult<()> {
        if self.state != ChannelState::Joined(room_id) {
            return Err(AppError::Denied("join the room before posting"));
        }
        let author_id = self.guard.require(self.identity, room_id, Action::Write).await?;
        // the echo arrives through the broadcaster like everyone else's copy
        self.messages.post_message(room_id, author_id, text).await?;
        Ok(())
    }

    /// Terminal. Removes the subscription before returning.
    pub fn disconnect(&mut self) {
        self.leave();
        self.state = ChannelState::Disconnected;
        tracing::debug!(channel_id = %self.id, "channel disconnected");
    }

    fn notify(&self, event: ServerEvent) {
        // a full or closed outbox means the client is stalled or gone; the reply is dropped
        let _ = self.outbox.try_send(event);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.leave();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::find_or_create_user, db::test_support::memory_pool, realtime::{outbox, Inbox}, rooms::RoomDirectory};

    struct Fixture {
        directory: RoomDirectory,
        guard: MembershipGuard,
        messages: MessageStore,
        broadcaster: Arc<Broadcaster>,
        room_id: Uuid,
        u1: Uuid,
        u2: Uuid,
    }

    impl Fixture {
        async fn new() -> Self {
            let db_pool = memory_pool().await;
            let u1 = find_or_create_user(&db_pool, "test:u1").await.unwrap();
            let u2 = find_or_create_user(&db_pool, "test:u2").await.unwrap();
            let directory = RoomDirectory::new(db_pool.clone());
            let room_id = directory.create_room("Alice vs Bob", u1).await.unwrap().id;
            let broadcaster = Arc::new(Broadcaster::new());
            Fixture {
                guard: MembershipGuard::new(directory.clone()),
                messages: MessageStore::new(db_pool, broadcaster.clone()),
                directory,
                broadcaster,
                room_id,
                u1,
                u2,
            }
        }

        fn channel(&self, identity: Identity) -> (Channel, Inbox) {
            let (tx, rx) = outbox();
            let channel = Channel::new(identity, tx, self.guard.clone(), self.messages.clone(), self.broadcaster.clone());
            (channel, rx)
        }
    }

    fn expect_denied(rx: &mut Inbox) -> String {
        match rx.try_recv().unwrap() {
            ServerEvent::Denied { reason } => reason,
            other => panic!("expected denied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn participant_joins() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));

        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;

        assert_eq!(rx.try_recv().unwrap(), ServerEvent::Joined { room_id: fx.room_id });
        assert_eq!(channel.state(), ChannelState::Joined(fx.room_id));
        assert!(fx.broadcaster.is_subscribed(fx.room_id, channel.id()));
    }

    #[tokio::test]
    async fn outsider_is_denied_and_stays_connected() {
        let fx = Fixture::new().await;
        for identity in [Identity::User(fx.u2), Identity::Anonymous] {
            let (mut channel, mut rx) = fx.channel(identity);
            channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;

            assert_eq!(expect_denied(&mut rx), "not a participant of this room");
            assert_eq!(channel.state(), ChannelState::Connected);
            assert_eq!(fx.broadcaster.subscriber_count(fx.room_id), 0);
        }
    }

    #[tokio::test]
    async fn unknown_room_is_reported_as_not_found() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: Uuid::now_v7() }).await;
        assert_eq!(expect_denied(&mut rx), "room not found");
        assert_eq!(channel.state(), ChannelState::Connected);
    }

    #[tokio::test]
    async fn post_without_join_is_rejected_and_not_persisted() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));

        channel.handle(ClientEvent::Post { room_id: fx.room_id, text: "hi".to_owned() }).await;

        assert_eq!(expect_denied(&mut rx), "join the room before posting");
        assert!(fx.messages.list_messages(fx.room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn post_echoes_to_poster() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        rx.try_recv().unwrap();

        channel.handle(ClientEvent::Post { room_id: fx.room_id, text: "hello".to_owned() }).await;

        match rx.try_recv().unwrap() {
            ServerEvent::Message { message } => {
                assert_eq!(message.body, "hello");
                assert_eq!(message.author_id, fx.u1);
            }
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_post_is_denied() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        rx.try_recv().unwrap();

        channel.handle(ClientEvent::Post { room_id: fx.room_id, text: String::new() }).await;

        assert_eq!(expect_denied(&mut rx), "message body cannot be empty");
        assert!(fx.messages.list_messages(fx.room_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn leave_returns_to_connected() {
        let fx = Fixture::new().await;
        let (mut channel, _rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;

        channel.handle(ClientEvent::Leave).await;

        assert_eq!(channel.state(), ChannelState::Connected);
        assert!(!fx.broadcaster.is_subscribed(fx.room_id, channel.id()));
    }

    #[tokio::test]
    async fn denied_join_keeps_the_current_room() {
        let fx = Fixture::new().await;
        let other_room = fx.directory.create_room("Carol vs Dan", fx.u2).await.unwrap().id;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        rx.try_recv().unwrap();

        channel.handle(ClientEvent::Join { room_id: other_room }).await;

        expect_denied(&mut rx);
        assert_eq!(channel.state(), ChannelState::Joined(fx.room_id));
        assert!(fx.broadcaster.is_subscribed(fx.room_id, channel.id()));
    }

    #[tokio::test]
    async fn joining_another_room_moves_the_subscription() {
        let fx = Fixture::new().await;
        let other_room = fx.directory.create_room("Carol vs Dan", fx.u1).await.unwrap().id;
        let (mut channel, _rx) = fx.channel(Identity::User(fx.u1));
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;

        channel.handle(ClientEvent::Join { room_id: other_room }).await;

        assert_eq!(channel.state(), ChannelState::Joined(other_room));
        assert!(!fx.broadcaster.is_subscribed(fx.room_id, channel.id()));
        assert!(fx.broadcaster.is_subscribed(other_room, channel.id()));
    }

    #[tokio::test]
    async fn disconnect_removes_subscription_before_next_fan_out() {
        let fx = Fixture::new().await;
        fx.directory.add_participant(fx.room_id, fx.u2).await.unwrap();
        let (mut leaving, mut leaving_rx) = fx.channel(Identity::User(fx.u2));
        leaving.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        leaving_rx.try_recv().unwrap();

        leaving.disconnect();
        assert_eq!(leaving.state(), ChannelState::Disconnected);
        assert_eq!(fx.broadcaster.subscriber_count(fx.room_id), 0);

        fx.messages.post_message(fx.room_id, fx.u1, "after").await.unwrap();
        assert!(leaving_rx.try_recv().is_err());

        leaving.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        assert!(leaving_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn join_racing_a_room_delete_is_refused() {
        let fx = Fixture::new().await;
        let (mut channel, mut rx) = fx.channel(Identity::User(fx.u1));
        let other_room = fx.directory.create_room("Carol vs Dan", fx.u1).await.unwrap().id;
        channel.handle(ClientEvent::Join { room_id: fx.room_id }).await;
        rx.try_recv().unwrap();

        // closed by the delete handler while the membership row is still readable
        fx.broadcaster.close_room(other_room, "room deleted");
        channel.handle(ClientEvent::Join { room_id: other_room }).await;

        assert_eq!(expect_denied(&mut rx), "room not found");
        assert_eq!(channel.state(), ChannelState::Joined(fx.room_id));
        assert_eq!(fx.broadcaster.subscriber_count(other_room), 0);
    }
}
