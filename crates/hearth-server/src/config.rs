use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, anyhow, bail};

use hearth_crypto::keys::key_from_base64;
use hearth_crypto::{HandshakeKey, KEY_LEN};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3811;
const DEFAULT_DB_PATH: &str = "hearth.db";

/// Startup configuration, read from `HEARTH_*` variables.
#[derive(Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub handshake_key: HandshakeKey,
    pub storage_key: [u8; KEY_LEN],
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("HEARTH_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = match lookup("HEARTH_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HEARTH_PORT is not a port number: {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let db_path = lookup("HEARTH_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.into())
            .into();

        let handshake_key = HandshakeKey::from_bytes(required_key(&lookup, "HEARTH_HANDSHAKE_KEY")?);
        let storage_key = required_key(&lookup, "HEARTH_STORAGE_KEY")?;
        if handshake_key.as_bytes() == &storage_key {
            bail!("HEARTH_HANDSHAKE_KEY and HEARTH_STORAGE_KEY must be different keys");
        }

        Ok(Self {
            host,
            port,
            db_path,
            handshake_key,
            storage_key,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}

fn required_key(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> anyhow::Result<[u8; KEY_LEN]> {
    let encoded = lookup(name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("{name} is not set (expected base64 of {KEY_LEN} random bytes)"))?;
    key_from_base64(encoded.trim()).with_context(|| format!("{name} is not a valid key"))
}
