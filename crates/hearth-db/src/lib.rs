pub mod migrations;
pub mod models;
pub mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::info;

use hearth_crypto::KEY_LEN;
use hearth_types::clock::{Clock, SystemClock};

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("at-rest encryption: {0}")]
    Crypto(#[from] hearth_crypto::CryptoError),

    #[error("username already taken: {0}")]
    UsernameTaken(String),

    /// A stored row could not be decoded (at-rest decryption or UTF-8).
    #[error("corrupt row in {table} (id {id})")]
    CorruptRow { table: &'static str, id: i64 },

    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Durable store for users, messages, channel relations and failed logins.
/// Pure data access: policy lives in the callers.
pub struct Database {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    /// Message text is encrypted under this key before it touches disk.
    storage_key: [u8; KEY_LEN],
}

impl Database {
    pub fn open(path: &Path, storage_key: [u8; KEY_LEN]) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn, storage_key)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory(storage_key: [u8; KEY_LEN]) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, storage_key)
    }

    fn init(conn: Connection, storage_key: [u8; KEY_LEN]) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            storage_key,
        })
    }

    /// Replace the time source used for `created_on` stamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }
}
