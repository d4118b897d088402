use sha2::{Digest, Sha256};

const ROUNDS: usize = 10;

/// Deterministic password digest: SHA-256 applied ten times, each round
/// hashing the previous round's lowercase hex. Comparison only, never reversed.
pub fn hash_password(password: &str) -> String {
    let mut digest = password.to_owned();
    for _ in 0..ROUNDS {
        digest = hex::encode(Sha256::digest(digest.as_bytes()));
    }
    digest
}
