use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::debug;

use parlor_types::models::{ChatMessage, NewTimelineEntry, PhotoMessage, TimelineEntry};

use crate::Database;
use crate::error::PersistenceError;
use crate::models::TimelineRow;

/// Number of entries replayed to a joining client.
pub const HISTORY_LIMIT: u32 = 100;

const KIND_MESSAGE: &str = "message";
const KIND_PHOTO: &str = "photo";

/// Append-only room timeline of messages and photos.
#[derive(Clone)]
pub struct TimelineStore {
    db: Arc<Database>,
}

impl TimelineStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a new entry, stamping it with the next id and the current time.
    /// An empty caption is stored as no caption.
    pub fn append(&self, entry: NewTimelineEntry) -> Result<TimelineEntry, PersistenceError> {
        let now = Utc::now();
        let timestamp = display_timestamp(&now.with_timezone(&Local));
        let created_at = now.to_rfc3339();

        let stored = match entry {
            NewTimelineEntry::Message { username, message } => {
                let id = self.db.insert_timeline_row(
                    KIND_MESSAGE,
                    &username,
                    &message,
                    None,
                    &timestamp,
                    &created_at,
                )?;
                TimelineEntry::Message(ChatMessage {
                    id,
                    username,
                    message,
                    timestamp,
                })
            }
            NewTimelineEntry::Photo {
                username,
                photo,
                caption,
            } => {
                let caption = caption.filter(|c| !c.is_empty());
                let id = self.db.insert_timeline_row(
                    KIND_PHOTO,
                    &username,
                    &photo,
                    caption.as_deref(),
                    &timestamp,
                    &created_at,
                )?;
                TimelineEntry::Photo(PhotoMessage {
                    id,
                    username,
                    photo,
                    caption,
                    timestamp,
                })
            }
        };

        debug!("Timeline entry {} appended by {}", stored.id(), stored.username());
        Ok(stored)
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recent_history(&self, limit: u32) -> Result<Vec<TimelineEntry>, PersistenceError> {
        let rows = self.db.get_recent_timeline(limit)?;
        let entries = rows
            .into_iter()
            .map(entry_from_row)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn entry_from_row(row: TimelineRow) -> anyhow::Result<TimelineEntry> {
    match row.kind.as_str() {
        KIND_MESSAGE => Ok(TimelineEntry::Message(ChatMessage {
            id: row.id,
            username: row.username,
            message: row.content,
            timestamp: row.timestamp,
        })),
        KIND_PHOTO => Ok(TimelineEntry::Photo(PhotoMessage {
            id: row.id,
            username: row.username,
            photo: row.content,
            caption: row.caption,
            timestamp: row.timestamp,
        })),
        other => Err(anyhow!("Corrupt kind '{}' on timeline entry {}", other, row.id)),
    }
}

/// Short human-readable form shown next to each entry, e.g. `Oct 19, 3:07 PM`.
pub fn display_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%b %-d, %-I:%M %p").to_string()
}
