use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use crate::CryptoError;

pub const KEY_LEN: usize = 32;

/// Generate a random 256-bit key for AES-256-GCM.
pub fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

/// Encode a key to base64 for the wire or for config files.
pub fn key_to_base64(key: &[u8; KEY_LEN]) -> String {
    BASE64.encode(key)
}

/// Decode a base64 key.
pub fn key_from_base64(encoded: &str) -> Result<[u8; KEY_LEN], CryptoError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| CryptoError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, b.len())))
}

// The two scopes share a representation but are separate types so a session
// key can never stand in for the handshake key or the other way round.
macro_rules! scoped_key {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        pub struct $name([u8; KEY_LEN]);

        impl $name {
            pub fn generate() -> Self {
                Self(generate_key())
            }

            pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
                Self(bytes)
            }

            pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
                key_from_base64(encoded).map(Self)
            }

            pub fn to_base64(&self) -> String {
                key_to_base64(&self.0)
            }

            pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($name), "(..)"))
            }
        }
    };
}

scoped_key!(
    /// Pre-shared key for the login/registration exchange, loaded from config.
    HandshakeKey
);

scoped_key!(
    /// Random key bound to one authenticated connection.
    SessionKey
);
