//! Whole-image persistence for the in-memory database.
//!
//! The snapshot is an ordinary SQLite file. Loading copies its rows into
//! the in-memory connection; flushing writes a fresh copy with
//! `VACUUM INTO` next to the target and renames it over the old file, so a
//! crash mid-flush leaves the previous snapshot intact.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

use crate::Database;

/// Copy all rows from the snapshot file at `path` into `conn`.
/// `conn` must already carry the current schema.
pub fn load(conn: &Connection, path: &Path) -> Result<()> {
    let path_str = path
        .to_str()
        .with_context(|| format!("snapshot path is not valid UTF-8: {}", path.display()))?;

    conn.execute("ATTACH DATABASE ?1 AS snapshot", [path_str])?;

    let copied = conn.execute_batch(
        "
        INSERT INTO main.users (id, username, password, created_at)
            SELECT id, username, password, created_at FROM snapshot.users;

        INSERT INTO main.timeline (id, kind, username, content, caption, timestamp, created_at)
            SELECT id, kind, username, content, caption, timestamp, created_at FROM snapshot.timeline;
        ",
    );

    // Detach even if the copy failed so the connection stays usable.
    conn.execute_batch("DETACH DATABASE snapshot")?;
    copied?;

    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write the full image of `conn` to `path`.
fn write_image(conn: &Connection, path: &Path) -> Result<()> {
    let tmp = temp_path(path);
    // VACUUM INTO refuses to overwrite a non-empty file.
    if tmp.exists() {
        std::fs::remove_file(&tmp)
            .with_context(|| format!("removing stale {}", tmp.display()))?;
    }

    let tmp_str = tmp
        .to_str()
        .with_context(|| format!("snapshot path is not valid UTF-8: {}", tmp.display()))?;
    conn.execute("VACUUM INTO ?1", [tmp_str])?;

    std::fs::rename(&tmp, path)
        .with_context(|| format!("replacing {} with {}", path.display(), tmp.display()))?;
    Ok(())
}

impl Database {
    /// Write the full image to the snapshot path, dirty or not.
    #[cfg(test)]
    pub(crate) fn flush(&self) -> Result<()> {
        let Some(path) = self.snapshot_path() else {
            return Ok(());
        };

        self.with_conn(|conn| {
            write_image(conn, path)?;
            self.dirty.store(false, Ordering::Release);
            Ok(())
        })?;
        tracing::debug!("Database flushed to {}", path.display());
        Ok(())
    }

    /// Write the full image only if something changed since the last flush.
    /// Returns whether a write happened. On failure the dirty mark is kept
    /// so the next call retries.
    pub fn flush_if_dirty(&self) -> Result<bool> {
        let Some(path) = self.snapshot_path() else {
            return Ok(false);
        };

        let flushed = self.with_conn(|conn| {
            if !self.dirty.swap(false, Ordering::AcqRel) {
                return Ok(false);
            }
            if let Err(e) = write_image(conn, path) {
                self.dirty.store(true, Ordering::Release);
                return Err(e);
            }
            Ok(true)
        })?;

        if flushed {
            info!("Database saved to {}", path.display());
        }
        Ok(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_then_reopen_restores_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let db = Database::open(&path).unwrap();
        db.create_user("alice", "hash", "2026-01-01T00:00:00Z").unwrap();
        db.insert_timeline_row("message", "alice", "hi", None, "Jan 1, 12:00 AM", "ca")
            .unwrap();
        db.insert_timeline_row("photo", "alice", "data:image/png;base64,AA", Some("cap"), "Jan 1, 12:01 AM", "ca")
            .unwrap();
        assert!(db.flush_if_dirty().unwrap());
        drop(db);

        let db = Database::open(&path).unwrap();
        assert!(!db.is_dirty());
        assert!(db.get_user_by_username("alice").unwrap().is_some());
        let rows = db.get_recent_timeline(100).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].caption.as_deref(), Some("cap"));

        // Ids continue after the restored rows.
        let id = db
            .insert_timeline_row("message", "alice", "again", None, "ts", "ca")
            .unwrap();
        assert_eq!(id, 3);
    }

    #[test]
    fn flush_if_dirty_skips_clean_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let db = Database::open(&path).unwrap();
        assert!(!db.flush_if_dirty().unwrap());
        assert!(!path.exists());

        db.create_user("alice", "hash", "2026-01-01T00:00:00Z").unwrap();
        assert!(db.flush_if_dirty().unwrap());
        assert!(!db.flush_if_dirty().unwrap());
        assert!(!temp_path(&path).exists());
    }

    #[test]
    fn repeated_flush_without_mutation_writes_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");

        let db = Database::open(&path).unwrap();
        db.create_user("alice", "hash", "2026-01-01T00:00:00Z").unwrap();
        db.insert_timeline_row("message", "alice", "hi", None, "ts", "ca").unwrap();

        db.flush().unwrap();
        let first = std::fs::read(&path).unwrap();
        db.flush().unwrap();
        let second = std::fs::read(&path).unwrap();

        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn in_memory_database_never_writes() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "hash", "2026-01-01T00:00:00Z").unwrap();
        assert!(!db.flush_if_dirty().unwrap());
    }

    #[test]
    fn corrupt_snapshot_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        std::fs::write(&path, b"definitely not sqlite").unwrap();

        assert!(Database::open(&path).is_err());
    }
}
