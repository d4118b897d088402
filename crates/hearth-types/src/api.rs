use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::{Channel, SavedMessage, User, UserId};

/// Body of requests that carry nothing the server reads. Whatever the client
/// sends (an echoed `user`, `null`, nothing) is accepted and discarded;
/// identity comes from the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Ignored;

impl<'de> Deserialize<'de> for Ignored {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Ignored)
    }
}

// -- Auth --

/// Body of `login` and `register`. `password_hash` is the client-side digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub user: User,
    /// Base64 of the 256-bit session key.
    pub session_key: String,
}

/// Which UI surface a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Process {
    Login,
    Registration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthError {
    pub description: String,
    pub process: Process,
}

impl AuthError {
    pub fn login(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            process: Process::Login,
        }
    }

    pub fn registration(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            process: Process::Registration,
        }
    }
}

// -- Messages --

/// A chat message as sent by a client. Identity comes from the session,
/// so any sender field the client echoes is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub chat_id: UserId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub chat_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesPack {
    pub chat_id: UserId,
    pub messages: Vec<SavedMessage>,
}

// -- Directory --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsPack {
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersPack {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestError {
    pub description: String,
}
