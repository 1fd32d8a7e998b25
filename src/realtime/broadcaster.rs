use std::{collections::{HashMap, HashSet}, sync::{Arc, Mutex, PoisonError, RwLock}};

use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::db::Message;

use super::ServerEvent;

/// Events a channel may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 64;

pub type ChannelId = Uuid;
pub type Outbox = mpsc::Sender<ServerEvent>;
pub type Inbox = mpsc::Receiver<ServerEvent>;

pub fn outbox() -> (Outbox, Inbox) {
    mpsc::channel(OUTBOX_CAPACITY)
}

type Bucket = Mutex<HashMap<ChannelId, Outbox>>;

#[derive(Default)]
struct Registry {
    rooms: HashMap<Uuid, Arc<Bucket>>,
    /// Deleted rooms; joins to them are refused.
    closed: HashSet<Uuid>,
}

/// Subscription registry: `room id -> joined channels`.
///
/// Lock order is registry, then bucket. A bucket is only dropped from the registry under
/// the registry write lock and only while empty, so a join can never land in a bucket
/// that is no longer reachable.
///
/// Delivery is at most once. A channel whose outbox is full or closed is pruned instead
/// of being waited on.
#[derive(Default)]
pub struct Broadcaster {
    registry: RwLock<Registry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false`, subscribing nothing, when the room has been closed.
    pub fn join(&self, room_id: Uuid, channel_id: ChannelId, outbox: Outbox) -> bool {
        {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            if registry.closed.contains(&room_id) {
                return false;
            }
            if let Some(bucket) = registry.rooms.get(&room_id) {
                bucket.lock().unwrap_or_else(PoisonError::into_inner).insert(channel_id, outbox);
                tracing::debug!(%room_id, %channel_id, "channel joined");
                return true;
            }
        }

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if registry.closed.contains(&room_id) {
            return false;
        }
        registry
            .rooms
            .entry(room_id)
            .or_default()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(channel_id, outbox);
        tracing::debug!(%room_id, %channel_id, "channel joined");
        true
    }

    /// Returns whether the channel was subscribed.
    pub fn leave(&self, room_id: Uuid, channel_id: ChannelId) -> bool {
        let emptied = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            let Some(bucket) = registry.rooms.get(&room_id) else {
                return false;
            };
            let mut channels = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            if channels.remove(&channel_id).is_none() {
                return false;
            }
            channels.is_empty()
        };
        tracing::debug!(%room_id, %channel_id, "channel left");

        if emptied {
            self.drop_if_empty(room_id);
        }
        true
    }

    fn drop_if_empty(&self, room_id: Uuid) {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let empty = registry
            .rooms
            .get(&room_id)
            .is_some_and(|bucket| bucket.lock().unwrap_or_else(PoisonError::into_inner).is_empty());
        if empty {
            registry.rooms.remove(&room_id);
        }
    }

    /// Fans `message` out to every channel joined to its room, echo included.
    /// Channels that are gone or stalled are pruned; returns the number delivered.
    pub fn publish(&self, message: &Message) -> usize {
        let room_id = message.room_id;
        let Some(bucket) = self.bucket(room_id) else {
            return 0;
        };

        let (delivered, emptied) = {
            let mut channels = bucket.lock().unwrap_or_else(PoisonError::into_inner);
            let mut pruned = Vec::new();
            for (channel_id, outbox) in channels.iter() {
                let event = ServerEvent::Message { message: message.clone() };
                match outbox.try_send(event) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(%room_id, %channel_id, "pruned stalled channel");
                        pruned.push(*channel_id);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(%room_id, %channel_id, "pruned dead channel");
                        pruned.push(*channel_id);
                    }
                }
            }
            for channel_id in &pruned {
                channels.remove(channel_id);
            }
            (channels.len(), !pruned.is_empty() && channels.is_empty())
        };

        if emptied {
            self.drop_if_empty(room_id);
        }
        delivered
    }

    /// Evicts every channel joined to a deleted room, telling each why. Later joins to
    /// the room are refused.
    pub fn close_room(&self, room_id: Uuid, reason: &str) -> usize {
        let bucket = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            registry.closed.insert(room_id);
            registry.rooms.remove(&room_id)
        };
        let Some(bucket) = bucket else {
            return 0;
        };
        let channels = std::mem::take(&mut *bucket.lock().unwrap_or_else(PoisonError::into_inner));
        for outbox in channels.values() {
            let _ = outbox.try_send(ServerEvent::denied(reason));
        }
        tracing::debug!(%room_id, evicted = channels.len(), "room closed");
        channels.len()
    }

    pub fn subscriber_count(&self, room_id: Uuid) -> usize {
        self.bucket(room_id)
            .map(|bucket| bucket.lock().unwrap_or_else(PoisonError::into_inner).len())
            .unwrap_or(0)
    }

    pub fn is_subscribed(&self, room_id: Uuid, channel_id: ChannelId) -> bool {
        self.bucket(room_id)
            .is_some_and(|bucket| bucket.lock().unwrap_or_else(PoisonError::into_inner).contains_key(&channel_id))
    }

    fn bucket(&self, room_id: Uuid) -> Option<Arc<Bucket>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner).rooms.get(&room_id).cloned()
    }
}
