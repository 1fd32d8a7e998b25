use std::sync::Arc;

use axum::{debug_handler, extract::{ws::{Message as WsMessage, WebSocket}, State, WebSocketUpgrade}, response::IntoResponse};
use futures_util::{SinkExt, StreamExt};
use crate::{rooms::{MembershipGuard, MessageStore}, session::Identity, AppState};

use super::{outbox, Broadcaster, Channel, ClientEvent};

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    identity: Identity,
    State(guard): State<MembershipGuard>,
    State(messages): State<MessageStore>,
    State(broadcaster): State<Arc<Broadcaster>>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_channel(stream, identity, guard, messages, broadcaster))
}

async fn serve_channel(
    stream: WebSocket,
    identity: Identity,
    guard: MembershipGuard,
    messages: MessageStore,
    broadcaster: Arc<Broadcaster>,
) {
    let (sink, mut inbox) = outbox();
    let mut channel = Channel::new(identity, sink, guard, messages, broadcaster);
    let channel_id = channel.id();
    tracing::debug!(%channel_id, user_id = ?identity.user_id(), "channel connected");

    let (mut sender, mut receiver) = stream.split();

    let mut writer_task = tokio::spawn(async move {
        while let Some(event) = inbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(%channel_id, error = %err, "could not encode server event");
                    continue;
                }
            };
            if sender.send(WsMessage::text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => {
                let Some(Ok(frame)) = frame else {
                    break;
                };
                let data = match frame {
                    WsMessage::Text(_) | WsMessage::Binary(_) => frame.into_data(),
                    WsMessage::Close(_) => break,
                    WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                };
                match serde_json::from_slice::<ClientEvent>(&data) {
                    Ok(event) => channel.handle(event).await,
                    Err(err) => channel.reject_malformed(&err),
                }
            }
            _ = &mut writer_task => break,
        }
    }

    channel.disconnect();
    writer_task.abort();
}
