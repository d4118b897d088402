use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use hearth_crypto::SessionKey;
use hearth_types::clock::{Clock, SystemClock};
use hearth_types::models::{User, UserId};

/// Identity of one live transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Authenticated state bound to one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user: User,
    pub key: SessionKey,
    pub created_at: DateTime<Utc>,
}

/// Live sessions keyed by connection. Cloning shares the same registry.
///
/// Sessions are inserted fully built and snapshots are cloned out under the
/// read lock, so readers never see a half-written or half-removed session.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: RwLock::new(HashMap::new()),
                clock,
            }),
        }
    }

    /// Bind a fresh session with a new random key, replacing any previous
    /// session on this connection.
    pub fn create(&self, connection_id: ConnectionId, user: User) -> Session {
        let session = Session {
            connection_id,
            user,
            key: SessionKey::generate(),
            created_at: self.inner.clock.now(),
        };
        self.write().insert(connection_id, session.clone());
        session
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<Session> {
        self.read().get(&connection_id).cloned()
    }

    pub fn remove(&self, connection_id: ConnectionId) -> Option<Session> {
        self.write().remove(&connection_id)
    }

    /// Every live session of one user (one per device).
    pub fn sessions_for_user(&self, user_id: UserId) -> Vec<Session> {
        self.read()
            .values()
            .filter(|s| s.user.id == user_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<Session> {
        self.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking reader cannot leave the map half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Session>> {
        self.inner.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Session>> {
        self.inner.sessions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
