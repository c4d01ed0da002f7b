use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::{TaskTracker, task_tracker::TaskTrackerToken};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parlor_db::timeline::HISTORY_LIMIT;
use parlor_db::{AuthError, CredentialStore, TimelineStore};
use parlor_types::events::{Credentials, GatewayCommand, GatewayEvent, Presence};
use parlor_types::models::NewTimelineEntry;

use crate::sessions::{ConnId, SessionRegistry};

/// Routes connection commands to the stores and fans events out to every
/// live connection.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    credentials: CredentialStore,
    timeline: TimelineStore,

    sessions: Mutex<SessionRegistry>,

    /// Outbound queue of every open connection: conn_id -> sender
    connections: RwLock<HashMap<ConnId, mpsc::UnboundedSender<GatewayEvent>>>,

    /// Cancelled once the gateway stops taking commands.
    closed: CancellationToken,
    /// One token per live connection task.
    connection_tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(credentials: CredentialStore, timeline: TimelineStore) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                credentials,
                timeline,
                sessions: Mutex::new(SessionRegistry::new()),
                connections: RwLock::new(HashMap::new()),
                closed: CancellationToken::new(),
                connection_tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn timeline(&self) -> &TimelineStore {
        &self.inner.timeline
    }

    /// Stop taking commands and tell every connection task to finish.
    /// Calling it again is a no-op.
    pub fn close(&self) {
        self.inner.closed.cancel();
        self.inner.connection_tasks.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Completes once `close` has been called.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await
    }

    /// Completes once the gateway is closed and every tracked connection
    /// task has finished. No command can write to the stores after this.
    pub async fn wait_closed(&self) {
        self.inner.connection_tasks.wait().await
    }

    /// Keeps `wait_closed` pending until the returned token is dropped.
    pub fn track_connection(&self) -> TaskTrackerToken {
        self.inner.connection_tasks.token()
    }

    /// Open a session for a new connection. Returns its id and the receiver
    /// for events addressed to it.
    pub async fn connect(&self) -> (ConnId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.sessions.lock().await.open(conn_id);
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection and announce the departure if it had joined.
    pub async fn disconnect(&self, conn_id: ConnId) {
        self.inner.connections.write().await.remove(&conn_id);

        let departed = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions
                .close(conn_id)
                .map(|username| (username, sessions.count()))
        };

        if let Some((username, user_count)) = departed {
            info!("{} left. Total users: {}", username, user_count);
            self.broadcast(GatewayEvent::UserLeft(Presence {
                username,
                user_count,
            }))
            .await;
        }
    }

    /// Send an event to every open connection.
    pub async fn broadcast(&self, event: GatewayEvent) {
        let connections = self.inner.connections.read().await;
        for tx in connections.values() {
            // A closed receiver means the connection is tearing down.
            let _ = tx.send(event.clone());
        }
    }

    /// Send an event to one connection.
    pub async fn send_to(&self, conn_id: ConnId, event: GatewayEvent) {
        if let Some(tx) = self.inner.connections.read().await.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Number of connections that have joined the room.
    #[cfg(test)]
    async fn user_count(&self) -> usize {
        self.inner.sessions.lock().await.count()
    }

    /// Parse and handle one text frame from a connection.
    pub async fn handle_text(&self, conn_id: ConnId, text: &str) {
        match serde_json::from_str::<GatewayCommand>(text) {
            Ok(cmd) => self.handle_command(conn_id, cmd).await,
            Err(e) => {
                warn!(
                    "{} bad command: {} -- raw: {}",
                    conn_id,
                    e,
                    text.chars().take(200).collect::<String>()
                );
                self.send_to(conn_id, GatewayEvent::Error("Malformed command".into()))
                    .await;
            }
        }
    }

    pub async fn handle_command(&self, conn_id: ConnId, cmd: GatewayCommand) {
        if self.is_closed() {
            debug!("{} sent a command after the gateway closed", conn_id);
            self.send_to(conn_id, GatewayEvent::Error("Server is shutting down".into()))
                .await;
            return;
        }

        match cmd {
            GatewayCommand::Register(creds) => self.register(conn_id, creds).await,

            GatewayCommand::Login(creds) => self.login(conn_id, creds).await,

            GatewayCommand::Join(display_name) => self.join(conn_id, display_name).await,

            GatewayCommand::ChatMessage(msg) => {
                self.post(
                    conn_id,
                    NewTimelineEntry::Message {
                        username: msg.username,
                        message: msg.message,
                    },
                )
                .await
            }

            GatewayCommand::PhotoMessage(photo) => {
                self.post(
                    conn_id,
                    NewTimelineEntry::Photo {
                        username: photo.username,
                        photo: photo.photo,
                        caption: photo.caption,
                    },
                )
                .await
            }
        }
    }

    async fn register(&self, conn_id: ConnId, creds: Credentials) {
        match self
            .inner
            .credentials
            .register(&creds.username, &creds.password)
            .await
        {
            Ok(username) => {
                self.inner.sessions.lock().await.mark_authenticated(conn_id);
                self.send_to(conn_id, GatewayEvent::RegisterSuccess(username))
                    .await;
            }
            Err(e @ (AuthError::InvalidInput | AuthError::AlreadyExists)) => {
                warn!("{} registration rejected for {:?}: {}", conn_id, creds.username, e);
                self.send_to(conn_id, GatewayEvent::RegisterFailed(e.to_string()))
                    .await;
            }
            Err(e) => {
                error!("Registration error: {}", e);
                self.send_to(conn_id, GatewayEvent::RegisterFailed("Registration failed".into()))
                    .await;
            }
        }
    }

    async fn login(&self, conn_id: ConnId, creds: Credentials) {
        match self
            .inner
            .credentials
            .verify(&creds.username, &creds.password)
            .await
        {
            Ok(true) => {
                self.inner.sessions.lock().await.mark_authenticated(conn_id);
                info!("User logged in: {}", creds.username);
                self.send_to(conn_id, GatewayEvent::LoginSuccess(creds.username))
                    .await;
            }
            // Unknown user and wrong password look the same to the client.
            Ok(false) | Err(AuthError::NotFound) => {
                warn!("{} failed login for {:?}", conn_id, creds.username);
                self.send_to(conn_id, GatewayEvent::LoginFailed(AuthError::NotFound.to_string()))
                    .await;
            }
            Err(e) => {
                error!("Login error: {}", e);
                self.send_to(conn_id, GatewayEvent::LoginFailed("Login failed".into()))
                    .await;
            }
        }
    }

    async fn join(&self, conn_id: ConnId, display_name: String) {
        let joined = {
            let mut sessions = self.inner.sessions.lock().await;
            sessions
                .join(conn_id, display_name.clone())
                .map(|()| sessions.count())
        };

        let user_count = match joined {
            Ok(count) => count,
            Err(_) => {
                self.send_to(conn_id, GatewayEvent::AuthRequired).await;
                return;
            }
        };

        info!("{} joined. Total users: {}", display_name, user_count);
        self.broadcast(GatewayEvent::UserJoined(Presence {
            username: display_name,
            user_count,
        }))
        .await;

        match self.inner.timeline.recent_history(HISTORY_LIMIT) {
            Ok(history) => {
                debug!("Replaying {} entries to {}", history.len(), conn_id);
                self.send_to(conn_id, GatewayEvent::ChatHistory(history))
                    .await;
            }
            Err(e) => {
                error!("Error loading chat history: {}", e);
                self.send_to(conn_id, GatewayEvent::Error("Could not load chat history".into()))
                    .await;
            }
        }
    }

    /// Append a message or photo and broadcast it. Requires an
    /// authenticated connection.
    async fn post(&self, conn_id: ConnId, entry: NewTimelineEntry) {
        if !self.inner.sessions.lock().await.is_authenticated(conn_id) {
            self.send_to(conn_id, GatewayEvent::AuthRequired).await;
            return;
        }

        match self.inner.timeline.append(entry) {
            Ok(stored) => self.broadcast(stored.into()).await,
            Err(e) => {
                error!("Error saving timeline entry: {}", e);
                self.send_to(conn_id, GatewayEvent::Error("Message could not be saved".into()))
                    .await;
            }
        }
    }
}
