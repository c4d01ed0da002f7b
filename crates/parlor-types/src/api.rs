use serde::{Deserialize, Serialize};

use crate::models::TimelineEntry;

// -- Posting --

/// Body of `POST /api/message`. Credentials travel with every request;
/// the HTTP surface keeps no session. Missing fields read as empty and are
/// rejected by the handler with a JSON error.
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostMessageRequest {
    pub username: String,
    pub password: String,
    pub message: String,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PostPhotoRequest {
    pub username: String,
    pub password: String,
    pub photo: String,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub success: bool,
    pub entry: TimelineEntry,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

// -- History --

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}
