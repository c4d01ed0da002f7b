use std::collections::HashMap;

use uuid::Uuid;

use parlor_db::AuthError;

/// Opaque id of one WebSocket connection.
pub type ConnId = Uuid;

#[derive(Debug, Default)]
struct Session {
    authenticated: bool,
    /// Set once the connection has joined the room.
    display_name: Option<String>,
}

/// Per-connection auth and presence state. Lives as long as the connection.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<ConnId, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a fresh, unauthenticated connection.
    pub fn open(&mut self, conn_id: ConnId) {
        self.sessions.insert(conn_id, Session::default());
    }

    pub fn mark_authenticated(&mut self, conn_id: ConnId) {
        if let Some(session) = self.sessions.get_mut(&conn_id) {
            session.authenticated = true;
        }
    }

    pub fn is_authenticated(&self, conn_id: ConnId) -> bool {
        self.sessions
            .get(&conn_id)
            .is_some_and(|s| s.authenticated)
    }

    /// Record the display name. Joining again replaces the name.
    pub fn join(&mut self, conn_id: ConnId, display_name: String) -> Result<(), AuthError> {
        match self.sessions.get_mut(&conn_id) {
            Some(session) if session.authenticated => {
                session.display_name = Some(display_name);
                Ok(())
            }
            _ => Err(AuthError::Unauthenticated),
        }
    }

    /// Forget the connection. Returns its display name if it had joined.
    pub fn close(&mut self, conn_id: ConnId) -> Option<String> {
        self.sessions
            .remove(&conn_id)
            .and_then(|s| s.display_name)
    }

    /// Number of connections that have joined the room.
    pub fn count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.display_name.is_some())
            .count()
    }
}
