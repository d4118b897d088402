use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;

/// Chat id of the shared group conversation. Never allocated to a user.
pub const GROUP_CHAT_ID: UserId = 0;

/// Public view of a user. The password digest never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
}

/// "`owner_id` keeps `peer_id`'s conversation in their sidebar."
/// Group and notes channels are derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub owner_id: UserId,
    pub peer_id: UserId,
    pub title: String,
}

/// A message as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub sender_username: String,
    pub chat_id: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Where a message with a given `chat_id` goes, relative to its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Group,
    Notes,
    Private { peer_id: UserId },
}

impl ChatKind {
    pub fn classify(sender_id: UserId, chat_id: UserId) -> Self {
        if chat_id == GROUP_CHAT_ID {
            Self::Group
        } else if chat_id == sender_id {
            Self::Notes
        } else {
            Self::Private { peer_id: chat_id }
        }
    }
}
