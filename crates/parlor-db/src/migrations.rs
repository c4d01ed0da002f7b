use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Messages and photos share one sequence so replay order is the
        -- insertion order across both kinds.
        CREATE TABLE IF NOT EXISTS timeline (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            kind        TEXT NOT NULL CHECK (kind IN ('message', 'photo')),
            username    TEXT NOT NULL,
            content     TEXT NOT NULL,
            caption     TEXT,
            timestamp   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        ",
    )?;

    debug!("Database migrations complete");
    Ok(())
}
