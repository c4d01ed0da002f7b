/// Database row types. These map directly to SQLite rows.
/// Distinct from parlor-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct TimelineRow {
    pub id: i64,
    pub kind: String,
    pub username: String,
    /// Message text for `message` rows, the encoded image for `photo` rows.
    pub content: String,
    pub caption: Option<String>,
    pub timestamp: String,
    pub created_at: String,
}
