use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use hearth_crypto::{decrypt, encrypt};
use hearth_types::models::{Channel, GROUP_CHAT_ID, SavedMessage, User};

use crate::models::{ChannelRow, MessageRow, UserRow, from_millis, to_millis};
use crate::{Database, DbError, Result};

impl Database {
    // -- Users --

    /// Returns the new user's id.
    pub fn add_user(&self, username: &str, password_hash: &str) -> Result<i64> {
        let now = to_millis(self.clock.now());
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password_hash, created_on) VALUES (?1, ?2, ?3)",
                params![username, password_hash, now],
            );
            match inserted {
                Ok(_) => Ok(conn.last_insert_rowid()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(DbError::UsernameTaken(username.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                [username],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// True only if the user exists and the stored digest equals `password_hash`.
    pub fn check_password(&self, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT password_hash FROM users WHERE username = ?1",
                    [username],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(stored.is_some_and(|s| s == password_hash))
        })
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, username FROM users ORDER BY id")?;
            let users = stmt
                .query_map([], |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    // -- Messages --

    /// Persist a message. `created_at` never goes backwards, even if the clock does.
    pub fn add_message(&self, sender_id: i64, chat_id: i64, text: &str) -> Result<SavedMessage> {
        let sealed = BASE64.encode(encrypt(&self.storage_key, text.as_bytes())?);
        let now = to_millis(self.clock.now());

        self.with_conn(|conn| {
            let latest: i64 = conn.query_row(
                "SELECT COALESCE(MAX(created_on), 0) FROM messages",
                [],
                |row| row.get(0),
            )?;
            let created_on = now.max(latest);

            conn.execute(
                "INSERT INTO messages (text, user_id, chat_id, created_on) VALUES (?1, ?2, ?3, ?4)",
                params![sealed, sender_id, chat_id, created_on],
            )?;
            let id = conn.last_insert_rowid();

            let sender_username: String = conn.query_row(
                "SELECT username FROM users WHERE id = ?1",
                [sender_id],
                |row| row.get(0),
            )?;

            Ok(SavedMessage {
                id,
                sender_id,
                sender_username,
                chat_id,
                text: text.to_string(),
                created_at: from_millis(created_on)
                    .ok_or(DbError::CorruptRow { table: "messages", id })?,
            })
        })
    }

    /// History of one chat as seen by `user_id`, oldest first.
    ///
    /// Group (`chat_id == 0`): every group message. Otherwise: both directions
    /// of the (`user_id`, `chat_id`) pair, which for notes is the same direction.
    pub fn messages_for_chat(&self, user_id: i64, chat_id: i64) -> Result<Vec<SavedMessage>> {
        let rows = self.with_conn(|conn| {
            if chat_id == GROUP_CHAT_ID {
                query_messages(conn, "m.chat_id = ?1", params![GROUP_CHAT_ID])
            } else {
                query_messages(
                    conn,
                    "(m.user_id = ?1 AND m.chat_id = ?2) OR (m.user_id = ?2 AND m.chat_id = ?1)",
                    params![user_id, chat_id],
                )
            }
        })?;

        rows.into_iter().map(|row| self.open_message(row)).collect()
    }

    fn open_message(&self, row: MessageRow) -> Result<SavedMessage> {
        let corrupt = || DbError::CorruptRow {
            table: "messages",
            id: row.id,
        };

        let sealed = BASE64.decode(&row.text).map_err(|_| corrupt())?;
        let plain = decrypt(&self.storage_key, &sealed).map_err(|_| corrupt())?;
        let text = String::from_utf8(plain).map_err(|_| corrupt())?;
        let created_at = from_millis(row.created_on).ok_or_else(corrupt)?;

        Ok(SavedMessage {
            id: row.id,
            sender_id: row.sender_id,
            sender_username: row.sender_username,
            chat_id: row.chat_id,
            text,
            created_at,
        })
    }

    // -- Channels --

    pub fn channels_for(&self, user_id: i64) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.user_id, c.chat_id, u.username
                 FROM saved_channels c
                 JOIN users u ON c.chat_id = u.id
                 WHERE c.user_id = ?1
                 ORDER BY c.id",
            )?;
            let channels = stmt
                .query_map([user_id], |row| {
                    Ok(ChannelRow {
                        user_id: row.get(0)?,
                        chat_id: row.get(1)?,
                        title: row.get(2)?,
                    })
                })?
                .map(|row| row.map(Channel::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(channels)
        })
    }

    pub fn channel_exists(&self, owner_id: i64, peer_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM saved_channels WHERE user_id = ?1 AND chat_id = ?2)",
                [owner_id, peer_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Returns true if the row was new.
    pub fn add_channel(&self, owner_id: i64, peer_id: i64) -> Result<bool> {
        self.with_conn(|conn| insert_channel(conn, owner_id, peer_id))
    }

    /// Write both directions of a private channel in one transaction.
    /// Returns true if either row was new.
    pub fn add_channel_pair(&self, a: i64, b: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let forward = insert_channel(&tx, a, b)?;
            let backward = insert_channel(&tx, b, a)?;
            tx.commit()?;
            Ok(forward || backward)
        })
    }

    // -- Failed logins --

    pub fn add_failed_login(&self, user_id: i64) -> Result<()> {
        let now = to_millis(self.clock.now());
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO failed_login (user_id, created_on) VALUES (?1, ?2)",
                [user_id, now],
            )?;
            Ok(())
        })
    }

    pub fn count_failed_logins(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM failed_login WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn last_failed_login(&self, user_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            let last: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT id, created_on FROM failed_login WHERE user_id = ?1
                     ORDER BY created_on DESC, id DESC LIMIT 1",
                    [user_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            last.map(|(id, millis)| {
                from_millis(millis).ok_or(DbError::CorruptRow {
                    table: "failed_login",
                    id,
                })
            })
            .transpose()
        })
    }

    /// Returns the number of records removed.
    pub fn clear_failed_logins(&self, user_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM failed_login WHERE user_id = ?1", [user_id])?;
            Ok(removed)
        })
    }
}

fn query_user(conn: &Connection, filter: &str, value: &dyn rusqlite::ToSql) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password_hash, created_on FROM users WHERE {}",
        filter
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                created_on: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(conn: &Connection, filter: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<MessageRow>> {
    // JOIN users to fetch the sender's name in a single query
    let mut stmt = conn.prepare(&format!(
        "SELECT m.id, m.user_id, u.username, m.chat_id, m.text, m.created_on
         FROM messages m
         JOIN users u ON m.user_id = u.id
         WHERE {}
         ORDER BY m.created_on ASC, m.id ASC",
        filter
    ))?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                sender_username: row.get(2)?,
                chat_id: row.get(3)?,
                text: row.get(4)?,
                created_on: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn insert_channel(conn: &Connection, owner_id: i64, peer_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO saved_channels (user_id, chat_id) VALUES (?1, ?2)",
        [owner_id, peer_id],
    )?;
    Ok(inserted > 0)
}
