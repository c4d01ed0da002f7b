use crate::models::{TimelineRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` without writing if the username is taken.
    pub fn create_user(&self, username: &str, password_hash: &str, created_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
                (username, password_hash, created_at),
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Timeline --

    /// Append a row and return its id.
    pub fn insert_timeline_row(
        &self,
        kind: &str,
        username: &str,
        content: &str,
        caption: Option<&str>,
        timestamp: &str,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO timeline (kind, username, content, caption, timestamp, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![kind, username, content, caption, timestamp, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The `limit` most recent rows, oldest first.
    pub fn get_recent_timeline(&self, limit: u32) -> Result<Vec<TimelineRow>> {
        self.with_conn(|conn| query_recent_timeline(conn, limit))
    }

    /// (users, timeline entries), for startup logging.
    pub fn counts(&self) -> Result<(u64, u64)> {
        self.with_conn(|conn| {
            let users = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            let entries = conn.query_row("SELECT COUNT(*) FROM timeline", [], |row| row.get(0))?;
            Ok((users, entries))
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_recent_timeline(conn: &Connection, limit: u32) -> Result<Vec<TimelineRow>> {
    // Newest `limit` rows, flipped back to insertion order.
    let mut stmt = conn.prepare(
        "SELECT id, kind, username, content, caption, timestamp, created_at
         FROM (
             SELECT * FROM timeline
             ORDER BY id DESC
             LIMIT ?1
         )
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([limit], |row| {
            Ok(TimelineRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                username: row.get(2)?,
                content: row.get(3)?,
                caption: row.get(4)?,
                timestamp: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username_is_not_inserted() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.create_user("alice", "hash-1", "2026-01-01T00:00:00Z").unwrap());
        assert!(!db.create_user("alice", "hash-2", "2026-01-01T00:00:01Z").unwrap());

        let user = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(user.password, "hash-1");
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn recent_timeline_keeps_newest_in_insertion_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.insert_timeline_row("message", "alice", &format!("m{}", i), None, "ts", "ca")
                .unwrap();
        }

        let rows = db.get_recent_timeline(3).unwrap();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_timeline_row("video", "alice", "x", None, "ts", "ca").is_err());
    }

    #[test]
    fn writes_mark_dirty_reads_do_not() {
        let db = Database::open_in_memory().unwrap();
        db.get_recent_timeline(10).unwrap();
        assert!(!db.is_dirty());
        db.insert_timeline_row("message", "alice", "hi", None, "ts", "ca").unwrap();
        assert!(db.is_dirty());
    }
}
