//! Event types for the real-time class rooms.
//!
//! Frames travel as `{"event": "<name>", "data": {...}}` with kebab-case
//! event names, the vocabulary the web client already speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who wrote a room message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Sender::User),
            "bot" => Some(Sender::Bot),
            _ => None,
        }
    }
}

/// A chat message posted to a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMessage {
    pub id: String,
    pub room_id: String,
    pub sender: Sender,
    /// Display name of the author
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl RoomMessage {
    /// Create a message from a room member
    pub fn from_user(
        room_id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender: Sender::User,
            author: author.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a message from the AI tutor
    pub fn from_bot(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            sender: Sender::Bot,
            author: "CourseConnect AI".to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Required fields are present
    pub fn is_valid(&self) -> bool {
        !self.room_id.trim().is_empty()
            && !self.author.trim().is_empty()
            && !self.text.trim().is_empty()
    }
}

/// Presence of one member in a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub user_id: String,
    pub user_name: String,
    /// Free-form status ("online", "away", ...)
    pub status: String,
    pub last_seen: DateTime<Utc>,
}

/// Frames sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart { room_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStop { room_id: String },
    #[serde(rename_all = "camelCase")]
    NewMessage { room_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    AiMention { room_id: String, question: String },
    #[serde(rename_all = "camelCase")]
    UpdatePresence { room_id: String, status: String },
}

/// Frames sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum RoomEvent {
    /// Snapshot delivered to a member right after joining
    #[serde(rename_all = "camelCase")]
    RoomState {
        room_id: String,
        members: Vec<Presence>,
        typing: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined { room_id: String, presence: Presence },
    #[serde(rename_all = "camelCase")]
    UserLeft { room_id: String, user_id: String },
    /// Full list of users currently typing
    #[serde(rename_all = "camelCase")]
    Typing { room_id: String, user_ids: Vec<String> },
    #[serde(rename_all = "camelCase")]
    PresenceUpdate { room_id: String, presence: Presence },
    NewMessage(RoomMessage),
    #[serde(rename_all = "camelCase")]
    MessageRejected { room_id: String, reason: String },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}
