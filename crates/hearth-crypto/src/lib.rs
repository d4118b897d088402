//! Hearth Crypto Library
//!
//! Symmetric AES-256-GCM with two key scopes:
//! - one process-wide handshake key protecting login/registration
//! - one random session key per authenticated connection
//!
//! The same primitive encrypts message text at rest under the storage key.

pub mod encrypt;
pub mod hash;
pub mod keys;

pub use encrypt::{decrypt, encrypt};
pub use hash::hash_password;
pub use keys::{HandshakeKey, KEY_LEN, SessionKey};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("encryption failed")]
    Encrypt,

    /// Wrong key or tampered ciphertext.
    #[error("decryption failed")]
    Decrypt,

    #[error("ciphertext shorter than its nonce ({0} bytes)")]
    Truncated(usize),

    #[error("invalid key: {0}")]
    InvalidKey(String),
}
