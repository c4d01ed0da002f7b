pub mod auth;
pub mod error;
pub mod messages;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Allowance on top of the payload limit for the JSON envelope, credentials
/// and caption around a photo.
pub const ENVELOPE_HEADROOM: usize = 16 * 1024;

/// HTTP routes for posting to and reading the room without a WebSocket.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/message", post(messages::post_message))
        .route("/api/photo", post(messages::post_photo))
        .route("/api/history", get(messages::get_history))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_body_bytes + ENVELOPE_HEADROOM))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
