use thiserror::Error;

/// A storage-layer failure. The underlying cause is kept for logging but
/// never shown to clients.
#[derive(Debug, Error)]
#[error("persistence failure: {0:#}")]
pub struct PersistenceError(#[from] anyhow::Error);

/// Failures of credential and session operations.
///
/// The `Display` text of `InvalidInput`, `AlreadyExists` and `NotFound` is
/// what clients see. `NotFound` and a password mismatch share one message
/// so the response does not reveal which usernames exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Username must be 3+ characters and password 6+ characters")]
    InvalidInput,

    #[error("Username already taken")]
    AlreadyExists,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid username or password")]
    NotFound,

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("password hashing failed: {0}")]
    Hash(String),
}
