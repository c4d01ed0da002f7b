pub mod credentials;
pub mod durability;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod snapshot;
pub mod timeline;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

pub use credentials::CredentialStore;
pub use error::{AuthError, PersistenceError};
pub use timeline::TimelineStore;

/// The chat database: an in-memory SQLite image that is written out
/// wholesale to `snapshot_path` by [`Database::flush_if_dirty`].
///
/// Every successful write through [`Database::with_conn_mut`] marks the
/// image dirty; flushing clears the mark.
pub struct Database {
    conn: Mutex<Connection>,
    dirty: AtomicBool,
    snapshot_path: Option<PathBuf>,
}

impl Database {
    /// Open the database, loading the snapshot at `path` if one exists.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        if path.exists() {
            snapshot::load(&conn, path)
                .with_context(|| format!("loading snapshot {}", path.display()))?;
            info!("Loaded existing database from {}", path.display());
        } else {
            info!("Created new database (will be saved to {})", path.display());
        }

        Ok(Self {
            conn: Mutex::new(conn),
            dirty: AtomicBool::new(false),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    /// A database that is never flushed anywhere.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            dirty: AtomicBool::new(false),
            snapshot_path: None,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Run a write. The dirty mark is set while the lock is still held so a
    /// concurrent flush either sees the write or leaves the mark set.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        let out = f(&conn)?;
        self.dirty.store(true, Ordering::Release);
        Ok(out)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }
}
