use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{info, warn};

use hearth_crypto::hash_password;
use hearth_db::{Database, DbError};
use hearth_gateway::{ConnectionId, Session, SessionRegistry};
use hearth_types::api::{AuthError, Credentials};
use hearth_types::clock::Clock;
use hearth_types::models::{User, UserId};

use crate::error::ApiError;

pub const FAILED_LOGIN_LIMIT: i64 = 5;
/// Failures older than this (counted from the latest one) no longer count.
pub const FAILED_LOGIN_WINDOW_SECS: i64 = 120;
pub const MAX_USERNAME_LEN: usize = 20;

#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(Session),
    Rejected(AuthError),
}

/// Login/registration policy on top of the store and the session registry.
pub struct AuthService {
    db: Arc<Database>,
    sessions: SessionRegistry,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(db: Arc<Database>, sessions: SessionRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { db, sessions, clock }
    }

    pub fn login(&self, connection_id: ConnectionId, creds: &Credentials) -> Result<AuthOutcome, ApiError> {
        let Some(user) = self.db.get_user_by_name(&creds.username)? else {
            warn!("login for unknown user {:?} on {}", creds.username, connection_id);
            return Ok(AuthOutcome::Rejected(AuthError::login("Username is not correct.")));
        };

        let remaining = self.remaining_attempts(user.id)?;
        if remaining <= 0 {
            warn!("{} ({}) is blocked after repeated failed logins", user.username, user.id);
            return Ok(AuthOutcome::Rejected(AuthError::login(format!(
                "You have tried login more than {} times. This username was blocked for 2 minutes.",
                FAILED_LOGIN_LIMIT
            ))));
        }

        if !self.db.check_password(&user.username, &hash_password(&creds.password_hash))? {
            self.db.add_failed_login(user.id)?;
            warn!("{} ({}) failed login, {} attempts left", user.username, user.id, remaining - 1);
            return Ok(AuthOutcome::Rejected(AuthError::login(format!(
                "Password is not correct. You can try again: {} times",
                remaining - 1
            ))));
        }

        self.authenticate(connection_id, user.public())
    }

    /// Create the account, then log it in on this connection.
    pub fn register(&self, connection_id: ConnectionId, creds: &Credentials) -> Result<AuthOutcome, ApiError> {
        let username = creds.username.as_str();

        if !is_valid_username(username) {
            return Ok(AuthOutcome::Rejected(AuthError::registration(format!(
                "Username {} is not valid.",
                username
            ))));
        }

        let taken = || {
            AuthOutcome::Rejected(AuthError::registration(format!(
                "Username {} already exists.",
                username
            )))
        };

        if self.db.user_exists(username)? {
            return Ok(taken());
        }

        let id = match self.db.add_user(username, &hash_password(&creds.password_hash)) {
            Ok(id) => id,
            // Lost a race with a concurrent registration of the same name.
            Err(DbError::UsernameTaken(_)) => return Ok(taken()),
            Err(e) => return Err(e.into()),
        };

        info!("registered {} ({})", username, id);
        self.authenticate(
            connection_id,
            User {
                id,
                username: username.to_string(),
            },
        )
    }

    fn authenticate(&self, connection_id: ConnectionId, user: User) -> Result<AuthOutcome, ApiError> {
        self.db.clear_failed_logins(user.id)?;
        let session = self.sessions.create(connection_id, user);
        info!(
            "{} ({}) logged in on {} ({} live sessions)",
            session.user.username,
            session.user.id,
            connection_id,
            self.sessions.len()
        );
        Ok(AuthOutcome::Authenticated(session))
    }

    /// Attempts left before the account is blocked. Stale failures are
    /// cleared here once the window since the latest one has passed.
    fn remaining_attempts(&self, user_id: UserId) -> Result<i64, ApiError> {
        let failures = self.db.count_failed_logins(user_id)?;
        if failures == 0 {
            return Ok(FAILED_LOGIN_LIMIT);
        }

        // Failures are stored at millisecond precision; compare at the same.
        let expired = match self.db.last_failed_login(user_id)? {
            Some(last) => {
                let elapsed = self.clock.now().timestamp_millis() - last.timestamp_millis();
                elapsed > TimeDelta::seconds(FAILED_LOGIN_WINDOW_SECS).num_milliseconds()
            }
            None => true,
        };
        if expired {
            self.db.clear_failed_logins(user_id)?;
            return Ok(FAILED_LOGIN_LIMIT);
        }

        Ok(FAILED_LOGIN_LIMIT - failures)
    }
}

/// Non-empty, at most 20 characters, no whitespace anywhere.
pub fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username.chars().count() <= MAX_USERNAME_LEN
        && !username.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use hearth_crypto::keys::generate_key;
    use hearth_types::api::Process;
    use hearth_types::clock::ManualClock;

    use super::*;

    struct Harness {
        auth: AuthService,
        sessions: SessionRegistry,
        db: Arc<Database>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::default());
        let db = Arc::new(
            Database::open_in_memory(generate_key())
                .unwrap()
                .with_clock(clock.clone()),
        );
        let sessions = SessionRegistry::with_clock(clock.clone());
        let auth = AuthService::new(db.clone(), sessions.clone(), clock.clone());
        Harness {
            auth,
            sessions,
            db,
            clock,
        }
    }

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: username.into(),
            password_hash: hash_password(password),
        }
    }

    fn rejection(outcome: AuthOutcome) -> AuthError {
        match outcome {
            AuthOutcome::Rejected(e) => e,
            AuthOutcome::Authenticated(s) => panic!("unexpectedly authenticated {:?}", s.user),
        }
    }

    fn session(outcome: AuthOutcome) -> Session {
        match outcome {
            AuthOutcome::Authenticated(s) => s,
            AuthOutcome::Rejected(e) => panic!("unexpectedly rejected: {}", e.description),
        }
    }

    #[test]
    fn register_then_login() {
        let h = harness();
        let conn = ConnectionId::new();

        let registered = session(h.auth.register(conn, &creds("alice", "pw")).unwrap());
        assert_eq!(registered.user.username, "alice");
        assert!(h.sessions.get(conn).is_some());

        let other = ConnectionId::new();
        let logged_in = session(h.auth.login(other, &creds("alice", "pw")).unwrap());
        assert_eq!(logged_in.user, registered.user);
        assert_ne!(logged_in.key, registered.key);
        assert_eq!(h.sessions.sessions_for_user(registered.user.id).len(), 2);
    }

    #[test]
    fn stored_digest_is_not_the_client_token() {
        let h = harness();
        let c = creds("alice", "pw");
        h.auth.register(ConnectionId::new(), &c).unwrap();

        let row = h.db.get_user_by_name("alice").unwrap().unwrap();
        assert_ne!(row.password_hash, c.password_hash);
    }

    #[test]
    fn unknown_username() {
        let h = harness();
        let err = rejection(h.auth.login(ConnectionId::new(), &creds("ghost", "pw")).unwrap());
        assert_eq!(err.description, "Username is not correct.");
        assert_eq!(err.process, Process::Login);
        assert!(h.sessions.is_empty());
    }

    #[test]
    fn wrong_password_counts_down() {
        let h = harness();
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();

        for left in (0..FAILED_LOGIN_LIMIT).rev() {
            let err = rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
            assert_eq!(
                err.description,
                format!("Password is not correct. You can try again: {} times", left)
            );
        }
    }

    #[test]
    fn sixth_attempt_is_blocked_even_with_right_password() {
        let h = harness();
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();

        for _ in 0..FAILED_LOGIN_LIMIT {
            h.clock.advance(TimeDelta::seconds(10));
            rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
        }

        let conn = ConnectionId::new();
        let err = rejection(h.auth.login(conn, &creds("alice", "pw")).unwrap());
        assert!(err.description.contains("blocked for 2 minutes"));
        assert!(h.sessions.get(conn).is_none());

        // Still blocked right at the edge of the window.
        h.clock.advance(TimeDelta::seconds(FAILED_LOGIN_WINDOW_SECS));
        let err = rejection(h.auth.login(conn, &creds("alice", "pw")).unwrap());
        assert!(err.description.contains("blocked"));
    }

    #[test]
    fn window_boundary_ignores_sub_millisecond_time() {
        let h = harness();
        h.clock.set(DateTime::from_timestamp(1_700_000_000, 999_999).unwrap());
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();
        for _ in 0..FAILED_LOGIN_LIMIT {
            rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
        }

        h.clock.advance(TimeDelta::seconds(FAILED_LOGIN_WINDOW_SECS));
        let err = rejection(h.auth.login(ConnectionId::new(), &creds("alice", "pw")).unwrap());
        assert!(err.description.contains("blocked"));

        h.clock.advance(TimeDelta::milliseconds(1));
        session(h.auth.login(ConnectionId::new(), &creds("alice", "pw")).unwrap());
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let h = harness();
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();

        for _ in 0..FAILED_LOGIN_LIMIT {
            rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
        }

        h.clock.advance(TimeDelta::seconds(FAILED_LOGIN_WINDOW_SECS + 1));
        let err = rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
        assert_eq!(err.description, "Password is not correct. You can try again: 4 times");

        let user = h.db.get_user_by_name("alice").unwrap().unwrap();
        assert_eq!(h.db.count_failed_logins(user.id).unwrap(), 1);
    }

    #[test]
    fn success_clears_failures() {
        let h = harness();
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();
        for _ in 0..3 {
            rejection(h.auth.login(ConnectionId::new(), &creds("alice", "nope")).unwrap());
        }

        let s = session(h.auth.login(ConnectionId::new(), &creds("alice", "pw")).unwrap());
        assert_eq!(h.db.count_failed_logins(s.user.id).unwrap(), 0);
    }

    #[test]
    fn registration_validates_usernames() {
        let h = harness();

        let err = rejection(h.auth.register(ConnectionId::new(), &creds("a b", "pw")).unwrap());
        assert_eq!(err.description, "Username a b is not valid.");
        assert_eq!(err.process, Process::Registration);

        let long = "x".repeat(21);
        rejection(h.auth.register(ConnectionId::new(), &creds(&long, "pw")).unwrap());
        rejection(h.auth.register(ConnectionId::new(), &creds("tab\there", "pw")).unwrap());
        rejection(h.auth.register(ConnectionId::new(), &creds("", "pw")).unwrap());

        let exact = "y".repeat(20);
        let s = session(h.auth.register(ConnectionId::new(), &creds(&exact, "pw")).unwrap());
        assert_eq!(s.user.username, exact);
    }

    #[test]
    fn username_length_counts_characters() {
        assert!(is_valid_username(&"é".repeat(20)));
        assert!(!is_valid_username(&"é".repeat(21)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let h = harness();
        h.auth.register(ConnectionId::new(), &creds("alice", "pw")).unwrap();

        let conn = ConnectionId::new();
        let err = rejection(h.auth.register(conn, &creds("alice", "other")).unwrap());
        assert_eq!(err.description, "Username alice already exists.");
        assert!(h.sessions.get(conn).is_none());
    }
}
