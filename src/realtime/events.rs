use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Message;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    Join { room_id: Uuid },
    Leave,
    Post { room_id: Uuid, text: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Joined { room_id: Uuid },
    Denied { reason: String },
    Message { message: Message },
}

impl ServerEvent {
    pub fn denied(reason: impl Into<String>) -> Self {
        ServerEvent::Denied { reason: reason.into() }
    }
}
