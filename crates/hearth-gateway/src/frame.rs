use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use hearth_crypto::{CryptoError, KEY_LEN, decrypt, encrypt};
use hearth_types::events::Frame;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("payload is not base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("payload is not a valid event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no event tag")]
    MissingTag,
}

/// Encrypt an `{event, data}`-tagged enum into a wire frame. The event name
/// stays in clear so the receiver can pick the key; only `data` is sealed.
pub fn seal<T: Serialize>(key: &[u8; KEY_LEN], message: &T) -> Result<Frame, FrameError> {
    let mut value = serde_json::to_value(message)?;

    let event = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingTag)?
        .to_owned();
    let data = value.get_mut("data").map(Value::take).unwrap_or(Value::Null);

    let plaintext = serde_json::to_vec(&data)?;
    let payload = B64.encode(encrypt(key, &plaintext)?);

    Ok(Frame { event, payload })
}

/// Decrypt a wire frame back into an `{event, data}`-tagged enum.
pub fn open<T: DeserializeOwned>(key: &[u8; KEY_LEN], frame: &Frame) -> Result<T, FrameError> {
    let sealed = B64.decode(&frame.payload)?;
    let plaintext = decrypt(key, &sealed)?;
    let data: Value = serde_json::from_slice(&plaintext)?;

    let mut tagged = Map::new();
    tagged.insert("event".into(), Value::String(frame.event.clone()));
    tagged.insert("data".into(), data);

    Ok(serde_json::from_value(Value::Object(tagged))?)
}

#[cfg(test)]
mod tests {
    use hearth_crypto::keys::generate_key;
    use hearth_types::api::{Credentials, Ignored, MessagesRequest, RequestError};
    use hearth_types::events::{Request, ServerEvent};

    use super::*;

    #[test]
    fn request_roundtrip() {
        let key = generate_key();
        let frame = seal(
            &key,
            &Request::Login(Credentials {
                username: "alice".into(),
                password_hash: "digest".into(),
            }),
        )
        .unwrap();

        assert_eq!(frame.event, "login");
        assert!(!frame.payload.contains("alice"));

        match open::<Request>(&key, &frame).unwrap() {
            Request::Login(creds) => {
                assert_eq!(creds.username, "alice");
                assert_eq!(creds.password_hash, "digest");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn bodiless_request_roundtrip() {
        let key = generate_key();
        let frame = seal(&key, &Request::GetChannels(Ignored)).unwrap();
        assert_eq!(frame.event, "get-channels");
        assert!(matches!(open::<Request>(&key, &frame).unwrap(), Request::GetChannels(_)));
    }

    #[test]
    fn bodiless_request_with_echoed_user_opens() {
        let key = generate_key();
        let body = br#"{"user":{"id":1,"username":"alice"}}"#;
        let frame = Frame {
            event: "get-channels".into(),
            payload: B64.encode(encrypt(&key, body).unwrap()),
        };
        assert!(matches!(open::<Request>(&key, &frame).unwrap(), Request::GetChannels(_)));
    }

    #[test]
    fn server_event_roundtrip() {
        let key = generate_key();
        let frame = seal(
            &key,
            &ServerEvent::Error(RequestError {
                description: "nope".into(),
            }),
        )
        .unwrap();
        assert_eq!(frame.event, "error");
        match open::<ServerEvent>(&key, &frame).unwrap() {
            ServerEvent::Error(e) => assert_eq!(e.description, "nope"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn other_key_cannot_open() {
        let frame = seal(&generate_key(), &Request::GetMessages(MessagesRequest { chat_id: 0 })).unwrap();
        assert!(matches!(
            open::<Request>(&generate_key(), &frame),
            Err(FrameError::Crypto(CryptoError::Decrypt))
        ));
    }

    #[test]
    fn garbage_payload_is_rejected() {
        let frame = Frame {
            event: "message".into(),
            payload: "%%%".into(),
        };
        assert!(matches!(
            open::<Request>(&generate_key(), &frame),
            Err(FrameError::Base64(_))
        ));
    }

    #[test]
    fn unknown_event_is_rejected() {
        let key = generate_key();
        let mut frame = seal(&key, &Request::GetUsers(Ignored)).unwrap();
        frame.event = "self-destruct".into();
        assert!(matches!(open::<Request>(&key, &frame), Err(FrameError::Json(_))));
    }
}
