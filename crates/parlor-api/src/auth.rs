use std::sync::Arc;

use tracing::warn;

use parlor_db::{CredentialStore, TimelineStore};
use parlor_gateway::Dispatcher;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub credentials: CredentialStore,
    pub timeline: TimelineStore,
    /// Posts made over HTTP are broadcast to WebSocket clients through here.
    pub dispatcher: Dispatcher,
}

impl AppStateInner {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            credentials: dispatcher.credentials().clone(),
            timeline: dispatcher.timeline().clone(),
            dispatcher,
        }
    }
}

/// Check a username/password pair sent with an HTTP request.
pub async fn authenticate(state: &AppStateInner, username: &str, password: &str) -> Result<(), ApiError> {
    if state.credentials.verify(username, password).await? {
        Ok(())
    } else {
        warn!("API request with bad password for {:?}", username);
        Err(ApiError::Unauthorized)
    }
}
