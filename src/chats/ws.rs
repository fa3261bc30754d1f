use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{AppState, auth::CurrentUser};

use super::{
    ChatError, ChatService, ConnectionId,
    events::{ClientEvent, PairPayload, ServerEvent},
    service::parse_participant,
};

#[debug_handler(state = AppState)]
pub(crate) async fn chat_ws(
    State(chats): State<ChatService>,
    CurrentUser(user): CurrentUser,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |stream| serve_socket(stream, chats, user.id))
}

async fn serve_socket(stream: WebSocket, chats: ChatService, user_id: Uuid) {
    let (conn, mut rx) = chats.relay().connect();
    let (mut sender, mut receiver) = stream.split();
    info!(%conn, %user_id, "socket opened");

    let mut outbox_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!("unserializable event: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => dispatch(&chats, conn, user_id, text.as_str()).await,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            // the peer stopped reading
            _ = &mut outbox_task => break,
        }
    }

    chats.relay().disconnect(conn);
    outbox_task.abort();
    info!(%conn, %user_id, open = chats.relay().connection_count(), "socket closed");
}

/// Handles one text frame from `conn`, authenticated as `user_id`.
/// Problems are reported back to that connection as an `error` event.
pub async fn dispatch(chats: &ChatService, conn: ConnectionId, user_id: Uuid, frame: &str) {
    let result = match serde_json::from_str::<ClientEvent>(frame) {
        Ok(event) => handle_event(chats, conn, user_id, event).await,
        Err(e) => Err(ChatError::validation(format!("malformed frame: {e}"))),
    };

    if let Err(e) = result {
        debug!(%conn, "rejected frame: {e}");
        let message = match e {
            ChatError::Database(_) | ChatError::Corrupt(_) => "message could not be saved".to_owned(),
            e => e.to_string(),
        };
        chats.relay().notify(conn, ServerEvent::Error { message });
    }
}

async fn handle_event(chats: &ChatService, conn: ConnectionId, user_id: Uuid, event: ClientEvent) -> Result<(), ChatError> {
    match event {
        ClientEvent::JoinChat(pair) => {
            let (sender, receiver) = own_pair(user_id, &pair)?;
            chats.relay().join(conn, sender, receiver);
            debug!(%conn, members = chats.relay().room_size(sender, receiver), "joined chat");
        }
        ClientEvent::LeaveChat(pair) => {
            let (sender, receiver) = own_pair(user_id, &pair)?;
            chats.relay().leave(conn, sender, receiver);
        }
        ClientEvent::SendMessage(msg) => {
            let (sender, receiver) = own_pair(user_id, &PairPayload {
                sender_id: msg.sender_id,
                receiver_id: msg.receiver_id,
            })?;
            chats.handle_incoming_live_message(sender, receiver, &msg.text).await?;
        }
    }
    Ok(())
}

fn own_pair(user_id: Uuid, pair: &PairPayload) -> Result<(Uuid, Uuid), ChatError> {
    let sender = parse_participant(&pair.sender_id)?;
    let receiver = parse_participant(&pair.receiver_id)?;
    if sender != user_id {
        return Err(ChatError::validation("senderId does not match the logged in user"));
    }
    if sender == receiver {
        return Err(ChatError::validation("senderId and receiverId must differ"));
    }
    Ok((sender, receiver))
}
