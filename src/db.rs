use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

// users and auth_tokens belong to the account service; they are created here so
// a fresh database can serve chats on its own.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          TEXT PRIMARY KEY,
    first_name  TEXT NOT NULL,
    last_name   TEXT,
    email       TEXT UNIQUE,
    avatar_url  TEXT
);

CREATE TABLE IF NOT EXISTS auth_tokens (
    token    TEXT PRIMARY KEY,
    user_id  TEXT NOT NULL REFERENCES users(id)
);

CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY,
    room_key        TEXT NOT NULL UNIQUE,
    participant_lo  TEXT NOT NULL,
    participant_hi  TEXT NOT NULL,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL,
    CHECK (participant_lo < participant_hi)
);
CREATE INDEX IF NOT EXISTS conversations_lo ON conversations(participant_lo, updated_at);
CREATE INDEX IF NOT EXISTS conversations_hi ON conversations(participant_hi, updated_at);

CREATE TABLE IF NOT EXISTS messages (
    seq              INTEGER PRIMARY KEY AUTOINCREMENT,
    id               TEXT NOT NULL UNIQUE,
    conversation_id  TEXT NOT NULL REFERENCES conversations(id),
    sender_id        TEXT NOT NULL,
    text             TEXT NOT NULL CHECK (length(text) > 0),
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS messages_conversation ON messages(conversation_id, seq);
"#;

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

pub async fn init_schema(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(db_pool).await?;
    Ok(())
}
