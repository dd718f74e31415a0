use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::AppState;

/// Frames sent by clients: `{"event": "<name>", "data": <payload>}`.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Payload is the user object; joins the room named by its `_id`.
    #[serde(rename = "setup")]
    Setup(Value),
    /// Payload is a chat id.
    #[serde(rename = "join chat")]
    JoinChat(Value),
    #[serde(rename = "typing")]
    Typing(Value),
    #[serde(rename = "stop typing")]
    StopTyping(Value),
    /// Payload is a stored message with its chat populated.
    #[serde(rename = "new message")]
    NewMessage(Value),
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "typing")]
    Typing,
    #[serde(rename = "stop typing")]
    StopTyping,
    // wire name kept as clients listen for it
    #[serde(rename = "message recieved")]
    MessageReceived(Value),
}

type Connections = Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>;
type Rooms = Arc<RwLock<HashMap<String, HashSet<Uuid>>>>;

/// In-memory room table shared by every socket of this process.
#[derive(Clone, Default)]
pub struct Relay {
    rooms: Rooms,
    connections: Connections,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.write().await.insert(id, tx);
        tracing::debug!(%id, "relay connection opened");
        (id, rx)
    }

    pub async fn disconnect(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(&id);
            !members.is_empty()
        });
        tracing::debug!(%id, "relay connection closed");
    }

    pub async fn dispatch(&self, id: Uuid, event: ClientEvent) {
        match event {
            ClientEvent::Setup(user) => match room_key(&user) {
                Some(room) => {
                    self.join(id, room).await;
                    self.send_to(id, ServerEvent::Connected).await;
                }
                None => tracing::warn!(%id, "setup without a user id"),
            },
            ClientEvent::JoinChat(room) => match room_key(&room) {
                Some(room) => self.join(id, room).await,
                None => tracing::warn!(%id, "join chat without a room"),
            },
            ClientEvent::Typing(room) => {
                if let Some(room) = room_key(&room) {
                    self.emit_to_room(&room, ServerEvent::Typing, Some(id)).await;
                }
            }
            ClientEvent::StopTyping(room) => {
                if let Some(room) = room_key(&room) {
                    self.emit_to_room(&room, ServerEvent::StopTyping, Some(id)).await;
                }
            }
            ClientEvent::NewMessage(message) => self.relay_message(id, message).await,
        }
    }

    async fn join(&self, id: Uuid, room: String) {
        tracing::debug!(%id, %room, "joined room");
        self.rooms.write().await.entry(room).or_default().insert(id);
    }

    async fn send_to(&self, id: Uuid, event: ServerEvent) {
        if let Some(tx) = self.connections.read().await.get(&id) {
            let _ = tx.send(event);
        }
    }

    /// Emits into the personal room of every chat member except the sender.
    async fn relay_message(&self, from: Uuid, message: Value) {
        let Some(users) = message.pointer("/chat/users").and_then(Value::as_array) else {
            tracing::warn!(%from, "new message without chat.users, dropped");
            return;
        };
        let sender = message.get("sender").and_then(room_key);

        for room in users.iter().filter_map(room_key) {
            if sender.as_ref() == Some(&room) {
                continue;
            }
            let event = ServerEvent::MessageReceived(message.clone());
            self.emit_to_room(&room, event, Some(from)).await;
        }
    }

    /// Returns how many connections the event was queued for.
    pub async fn emit_to_room(&self, room: &str, event: ServerEvent, except: Option<Uuid>) -> usize {
        let members: Vec<Uuid> = match self.rooms.read().await.get(room) {
            Some(members) => members
                .iter()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect(),
            None => return 0,
        };

        let connections = self.connections.read().await;
        members
            .iter()
            .filter_map(|id| connections.get(id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn handle_socket(self, socket: WebSocket) {
        let (id, mut rx) = self.connect().await;
        let (mut ws_tx, mut ws_rx) = socket.split();

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode relay event: {e}");
                        continue;
                    }
                };
                if ws_tx.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => self.dispatch(id, event).await,
                    Err(e) => tracing::warn!(%id, "malformed relay frame: {e}"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(%id, "relay socket error: {e}");
                    break;
                }
            }
        }

        self.disconnect(id).await;
        writer.abort();
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let relay = state.relay.clone();
    ws.on_upgrade(move |socket| relay.handle_socket(socket))
}

/// Room name for a user or chat given as an id or as an object with `_id`.
fn room_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("_id").and_then(room_key),
        _ => None,
    }
}
