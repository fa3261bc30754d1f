#![allow(dead_code)]

use std::path::PathBuf;

use devtalk::{AppState, db};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tokio::sync::mpsc;
use uuid::Uuid;

use devtalk::chats::events::ServerEvent;

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
    pub name: String,
}

/// Fresh in-memory database with the schema applied. One connection, kept open
/// for the life of the pool, so every query sees the same database.
pub async fn memory_pool() -> SqlitePool {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory database");
    db::init_schema(&db_pool).await.expect("Failed to create schema");
    db_pool
}

/// File-backed database with several connections, for tests that need real
/// concurrent writers. The caller removes the file.
pub async fn file_pool(prefix: &str) -> (SqlitePool, PathBuf) {
    let path = std::env::temp_dir().join(format!("{prefix}_{}.db", Uuid::new_v4().simple()));
    let db_pool = db::connect(&format!("sqlite://{}", path.display()), 8)
        .await
        .expect("Failed to open database file");
    db::init_schema(&db_pool).await.expect("Failed to create schema");
    (db_pool, path)
}

pub async fn test_state() -> AppState {
    AppState::new(memory_pool().await)
}

pub async fn seed_user(db_pool: &SqlitePool, first_name: &str, last_name: &str) -> TestUser {
    let id = Uuid::new_v4();
    let token = format!("token-{}", Uuid::new_v4().simple());

    sqlx::query("INSERT INTO users (id,first_name,last_name,email,avatar_url) VALUES (?,?,?,?,?)")
        .bind(id.to_string())
        .bind(first_name)
        .bind(last_name)
        .bind(format!("{}@example.com", id.simple()))
        .bind(format!("https://img.example.com/{}.png", id.simple()))
        .execute(db_pool)
        .await
        .expect("Failed to insert user");
    sqlx::query("INSERT INTO auth_tokens (token,user_id) VALUES (?,?)")
        .bind(&token)
        .bind(id.to_string())
        .execute(db_pool)
        .await
        .expect("Failed to insert token");

    TestUser { id, token, name: format!("{first_name} {last_name}") }
}

/// Every event queued for a connection so far.
pub fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn received_texts(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<(Uuid, String)> {
    drain(rx)
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::ReceiveMessage(m) => Some((m.sender_id, m.text)),
            ServerEvent::Error { .. } => None,
        })
        .collect()
}
