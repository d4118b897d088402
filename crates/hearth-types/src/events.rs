use serde::{Deserialize, Serialize};

use crate::api::{
    AuthError, ChannelsPack, Credentials, Ignored, LoginSuccess, MessagesPack, MessagesRequest,
    OutgoingMessage, RequestError, UsersPack,
};
use crate::models::SavedMessage;

/// One WebSocket text message, in either direction.
///
/// `payload` is base64 of `nonce || AES-256-GCM(key, json(data))`, where the
/// key is the handshake key for [`Request::is_handshake`] events and their
/// replies, and the recipient's session key for everything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    pub payload: String,
}

/// Requests sent FROM client TO server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum Request {
    /// Authenticate with an existing account
    Login(Credentials),

    /// Create an account and authenticate with it
    Register(Credentials),

    /// Post to the group, a private chat or the caller's notes
    Message(OutgoingMessage),

    /// Fetch the history of one chat
    GetMessages(MessagesRequest),

    /// Fetch the caller's private channels
    GetChannels(Ignored),

    /// Fetch the user directory
    GetUsers(Ignored),

    /// Drop the caller's session but keep the connection
    Logout(Ignored),
}

impl Request {
    pub const LOGIN: &'static str = "login";
    pub const REGISTER: &'static str = "register";

    /// Events that travel under the handshake key, before any session exists.
    pub fn is_handshake(event: &str) -> bool {
        event == Self::LOGIN || event == Self::REGISTER
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Login(_) => Self::LOGIN,
            Self::Register(_) => Self::REGISTER,
            Self::Message(_) => "message",
            Self::GetMessages(_) => "get-messages",
            Self::GetChannels(_) => "get-channels",
            Self::GetUsers(_) => "get-users",
            Self::Logout(_) => "logout",
        }
    }
}

/// Events sent FROM server TO client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Login or registration succeeded
    Login(LoginSuccess),

    FailedLogin(AuthError),

    FailedRegistration(AuthError),

    /// A message was posted to a chat the recipient takes part in
    Message(SavedMessage),

    GetMessages(MessagesPack),

    /// Channel list, as a reply or because a new private channel appeared
    GetChannels(ChannelsPack),

    GetUsers(UsersPack),

    /// An authenticated request could not be served
    Error(RequestError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_names_match_serde_tags() {
        let requests = [
            Request::Login(Credentials {
                username: "a".into(),
                password_hash: "h".into(),
            }),
            Request::GetMessages(MessagesRequest { chat_id: 0 }),
            Request::GetChannels(Ignored),
            Request::Logout(Ignored),
        ];
        for request in requests {
            let value = serde_json::to_value(&request).unwrap();
            assert_eq!(value["event"], request.name());
        }
    }

    #[test]
    fn bodiless_request_accepts_null_data() {
        let request: Request = serde_json::from_str(r#"{"event":"get-channels","data":null}"#).unwrap();
        assert!(matches!(request, Request::GetChannels(_)));
    }

    #[test]
    fn bodiless_request_ignores_echoed_user() {
        let request: Request =
            serde_json::from_str(r#"{"event":"get-users","data":{"user":{"id":1,"username":"alice"}}}"#)
                .unwrap();
        assert!(matches!(request, Request::GetUsers(_)));

        let request: Request = serde_json::from_str(r#"{"event":"logout","data":{}}"#).unwrap();
        assert!(matches!(request, Request::Logout(_)));
    }

    #[test]
    fn echoed_identity_is_ignored() {
        let request: Request = serde_json::from_str(
            r#"{"event":"message","data":{"chat_id":0,"text":"hi","sender_user":{"id":9}}}"#,
        )
        .unwrap();
        match request {
            Request::Message(msg) => assert_eq!(msg.text, "hi"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn handshake_events() {
        assert!(Request::is_handshake("login"));
        assert!(Request::is_handshake("register"));
        assert!(!Request::is_handshake("message"));
    }
}
