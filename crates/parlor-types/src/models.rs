use serde::{Deserialize, Serialize};

/// One entry of the shared room timeline, as persisted and replayed.
///
/// Serialized with an inline `type` tag (`"message"` or `"photo"`) so a
/// history array can be rendered without a second lookup per entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TimelineEntry {
    Message(ChatMessage),
    Photo(PhotoMessage),
}

impl TimelineEntry {
    pub fn id(&self) -> i64 {
        match self {
            Self::Message(m) => m.id,
            Self::Photo(p) => p.id,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Self::Message(m) => &m.username,
            Self::Photo(p) => &p.username,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub username: String,
    pub message: String,
    /// Display timestamp, formatted when the message was written.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoMessage {
    pub id: i64,
    pub username: String,
    /// Encoded image, usually a `data:image/...;base64,` URL.
    pub photo: String,
    pub caption: Option<String>,
    pub timestamp: String,
}

/// A timeline entry before the store has assigned its id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewTimelineEntry {
    Message {
        username: String,
        message: String,
    },
    Photo {
        username: String,
        photo: String,
        caption: Option<String>,
    },
}
