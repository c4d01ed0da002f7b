use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, PhotoMessage, TimelineEntry};

/// Commands sent FROM client TO server over the WebSocket gateway.
///
/// Frames look like `{"type": "chat message", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Create an account and authenticate this connection
    #[serde(rename = "register")]
    Register(Credentials),

    /// Authenticate this connection against an existing account
    #[serde(rename = "login")]
    Login(Credentials),

    /// Enter the room under a display name
    #[serde(rename = "join")]
    Join(String),

    /// Post a text message to the room
    #[serde(rename = "chat message")]
    ChatMessage(SendMessage),

    /// Post an encoded photo to the room
    #[serde(rename = "photo message")]
    PhotoMessage(SendPhoto),
}

/// Events sent FROM server TO client over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    #[serde(rename = "register success")]
    RegisterSuccess(String),

    #[serde(rename = "register failed")]
    RegisterFailed(String),

    #[serde(rename = "login success")]
    LoginSuccess(String),

    #[serde(rename = "login failed")]
    LoginFailed(String),

    /// The connection tried a gated action before register/login
    #[serde(rename = "auth required")]
    AuthRequired,

    /// Recent timeline, oldest first. Sent only to the joining connection.
    #[serde(rename = "chat history")]
    ChatHistory(Vec<TimelineEntry>),

    #[serde(rename = "user joined")]
    UserJoined(Presence),

    #[serde(rename = "user left")]
    UserLeft(Presence),

    #[serde(rename = "chat message")]
    ChatMessage(ChatMessage),

    #[serde(rename = "photo message")]
    PhotoMessage(PhotoMessage),

    /// A command could not be parsed or persisted
    #[serde(rename = "error")]
    Error(String),
}

impl From<TimelineEntry> for GatewayEvent {
    fn from(entry: TimelineEntry) -> Self {
        match entry {
            TimelineEntry::Message(m) => Self::ChatMessage(m),
            TimelineEntry::Photo(p) => Self::PhotoMessage(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    pub username: String,
    #[serde(rename = "userCount")]
    pub user_count: usize,
}

/// Missing fields deserialize as empty strings and fail validation downstream.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessage {
    pub username: String,
    pub message: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SendPhoto {
    pub username: String,
    pub photo: String,
    #[serde(default)]
    pub caption: Option<String>,
}

// Photo payloads run to megabytes; keep them out of logs.
impl fmt::Debug for SendPhoto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendPhoto")
            .field("username", &self.username)
            .field("photo_len", &self.photo.len())
            .field("caption", &self.caption)
            .finish()
    }
}
