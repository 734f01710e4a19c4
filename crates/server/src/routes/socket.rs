//! Real-time class rooms over WebSocket, plus persisted room history.
//!
//! Each connection runs a [`Session`]: client frames are decoded into
//! [`ClientEvent`]s and applied to the shared room hub; room broadcasts and
//! direct replies funnel through one outgoing channel drained by a writer
//! task.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use services::content_filter::check_content;
use shared::events::{ClientEvent, RoomEvent, RoomMessage};
use std::collections::HashMap;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

const DEFAULT_HISTORY: usize = 50;
const MAX_HISTORY: usize = 200;
const MAX_MESSAGE_CHARS: usize = 2000;

#[derive(Deserialize)]
pub struct HistoryQuery {
    limit: Option<usize>,
}

pub async fn history(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Vec<RoomMessage>>> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    Ok(Json(state.store.recent_messages(&room_id, limit)?))
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = unbounded_channel::<RoomEvent>();

    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("failed to encode room event: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session::new(state, out_tx);
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_frame(text.as_str()),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
    session.close();
    writer.abort();
}

/// Per-connection state: who the client is and which rooms it follows.
pub(crate) struct Session {
    state: AppState,
    out: UnboundedSender<RoomEvent>,
    user: Option<(String, String)>,
    joined: HashMap<String, JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(state: AppState, out: UnboundedSender<RoomEvent>) -> Self {
        Self {
            state,
            out,
            user: None,
            joined: HashMap::new(),
        }
    }

    fn reply(&self, event: RoomEvent) {
        let _ = self.out.send(event);
    }

    fn error(&self, message: impl Into<String>) {
        self.reply(RoomEvent::Error {
            message: message.into(),
        });
    }

    pub(crate) fn handle_frame(&mut self, raw: &str) {
        match serde_json::from_str::<ClientEvent>(raw) {
            Ok(event) => self.handle(event),
            Err(e) => self.error(format!("unrecognised frame: {}", e)),
        }
    }

    pub(crate) fn handle(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::JoinRoom {
                room_id,
                user_id,
                user_name,
            } => self.join(room_id, user_id, user_name),
            ClientEvent::LeaveRoom { room_id } => self.leave(&room_id),
            ClientEvent::TypingStart { room_id } => self.typing(&room_id, true),
            ClientEvent::TypingStop { room_id } => self.typing(&room_id, false),
            ClientEvent::NewMessage { room_id, text } => self.post(room_id, text),
            ClientEvent::AiMention { room_id, question } => {
                if !self.joined.contains_key(&room_id) {
                    self.error(format!("join {} before asking the tutor", room_id));
                } else if let Some(question) = self.screen(&room_id, &question) {
                    self.ask_tutor(room_id, question);
                }
            }
            ClientEvent::UpdatePresence { room_id, status } => {
                if let Some((user_id, _)) = &self.user {
                    self.state.rooms.update_presence(&room_id, user_id, &status);
                }
            }
        }
    }

    fn join(&mut self, room_id: String, user_id: String, user_name: String) {
        let (room_id, user_id, user_name) = (
            room_id.trim().to_string(),
            user_id.trim().to_string(),
            user_name.trim().to_string(),
        );
        if room_id.is_empty() || user_id.is_empty() || user_name.is_empty() {
            self.error("roomId, userId and userName are required");
            return;
        }
        if let Some((current, _)) = &self.user {
            if *current != user_id {
                self.error("a connection can only act as one user");
                return;
            }
        }
        // joining again replaces this connection's subscription
        if let Some(previous) = self.joined.remove(&room_id) {
            previous.abort();
            self.state.rooms.leave(&room_id, &user_id);
        }

        let (rx, snapshot) = self.state.rooms.join(&room_id, &user_id, &user_name);
        self.reply(snapshot);
        self.joined
            .insert(room_id.clone(), tokio::spawn(forward(rx, self.out.clone())));
        tracing::info!("{} ({}) joined room {}", user_name, user_id, room_id);
        self.user = Some((user_id, user_name));
    }

    fn leave(&mut self, room_id: &str) {
        if let Some(task) = self.joined.remove(room_id) {
            task.abort();
        }
        if let Some((user_id, _)) = &self.user {
            self.state.rooms.leave(room_id, user_id);
        }
    }

    fn typing(&self, room_id: &str, typing: bool) {
        if let Some((user_id, _)) = &self.user {
            self.state.rooms.set_typing(room_id, user_id, typing);
        }
    }

    fn post(&mut self, room_id: String, text: String) {
        let Some((user_id, user_name)) = self.user.clone() else {
            self.error("join a room before posting");
            return;
        };
        if !self.joined.contains_key(&room_id) {
            self.error(format!("not a member of {}", room_id));
            return;
        }
        let Some(text) = self.screen(&room_id, &text) else {
            return;
        };

        let message = RoomMessage::from_user(&room_id, user_name, &text);
        if let Err(e) = self.state.store.save_message(&message) {
            tracing::error!("failed to persist message in {}: {:#}", room_id, e);
            self.error("message could not be saved");
            return;
        }
        self.state.rooms.set_typing(&room_id, &user_id, false);
        self.state.rooms.publish(&room_id, RoomEvent::NewMessage(message));

        if let Some(question) = ai_mention(&text) {
            self.ask_tutor(room_id, question);
        }
    }

    /// Trimmed text if it may be posted. Blank text is dropped silently;
    /// over-long or flagged text is refused with `message-rejected`.
    fn screen(&self, room_id: &str, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            self.reply(RoomEvent::MessageRejected {
                room_id: room_id.to_string(),
                reason: format!("messages are limited to {} characters", MAX_MESSAGE_CHARS),
            });
            return None;
        }
        let verdict = check_content(text);
        if !verdict.is_safe {
            self.reply(RoomEvent::MessageRejected {
                room_id: room_id.to_string(),
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "inappropriate content".to_string()),
            });
            return None;
        }
        Some(text.to_string())
    }

    /// Answer in the background and post the reply as a bot message.
    fn ask_tutor(&self, room_id: String, question: String) {
        let state = self.state.clone();
        tokio::spawn(async move {
            let context = match state.store.get_group(&room_id) {
                Ok(Some(group)) => Some(format!("{} {}", group.class_code, group.class_name)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!("could not load group {}: {:#}", room_id, e);
                    None
                }
            };
            let reply = state.tutor.ask(&question, context.as_deref()).await;
            let message = RoomMessage::from_bot(&room_id, reply.response);
            if let Err(e) = state.store.save_message(&message) {
                tracing::error!("failed to persist tutor reply in {}: {:#}", room_id, e);
            }
            state.rooms.publish(&room_id, RoomEvent::NewMessage(message));
        });
    }

    /// Leave every joined room.
    pub(crate) fn close(&mut self) {
        let rooms: Vec<String> = self.joined.keys().cloned().collect();
        for room_id in rooms {
            self.leave(&room_id);
        }
        if let Some((user_id, _)) = &self.user {
            tracing::debug!("{} disconnected", user_id);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

async fn forward(mut rx: Receiver<RoomEvent>, out: UnboundedSender<RoomEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if out.send(event).is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("slow client skipped {} room events", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// The question in a message addressed to `@ai`, if any.
pub(crate) fn ai_mention(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let idx = lower.find("@ai")?;
    let end = idx + "@ai".len();
    // "@aiden" is a person, not the tutor
    if lower[end..].chars().next().is_some_and(|c| c.is_alphanumeric()) {
        return None;
    }
    let question = format!("{} {}", &text[..idx], &text[end..]);
    let question = question.split_whitespace().collect::<Vec<_>>().join(" ");
    let question = question.trim_start_matches([',', ':']).trim().to_string();
    Some(if question.is_empty() {
        "Hello!".to_string()
    } else {
        question
    })
}
