use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        // AUTOINCREMENT starts at 1, so chat id 0 can never name a user.
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                created_on      INTEGER NOT NULL
            );

            CREATE TABLE messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                chat_id     INTEGER NOT NULL,
                created_on  INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, created_on);

            CREATE INDEX idx_messages_pair
                ON messages(user_id, chat_id);

            CREATE TABLE saved_channels (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                chat_id     INTEGER NOT NULL REFERENCES users(id),
                UNIQUE(user_id, chat_id)
            );

            CREATE TABLE failed_login (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                created_on  INTEGER NOT NULL
            );

            CREATE INDEX idx_failed_login_user
                ON failed_login(user_id, created_on);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
