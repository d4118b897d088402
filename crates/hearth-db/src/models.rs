use chrono::{DateTime, Utc};

use hearth_types::models::{Channel, User};

/// Database row types: these map directly to SQLite rows.
/// Distinct from hearth-types models to keep the DB layer independent.
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_on: i64,
}

impl UserRow {
    pub fn public(&self) -> User {
        User {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// `text` is still sealed under the storage key here.
pub struct MessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub sender_username: String,
    pub chat_id: i64,
    pub text: String,
    pub created_on: i64,
}

pub struct ChannelRow {
    pub user_id: i64,
    pub chat_id: i64,
    pub title: String,
}

impl From<ChannelRow> for Channel {
    fn from(row: ChannelRow) -> Self {
        Channel {
            owner_id: row.user_id,
            peer_id: row.chat_id,
            title: row.title,
        }
    }
}

pub fn to_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}
