//! Lookup of user records owned by the account subsystem.

use async_trait::async_trait;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::chats::{ChatError, ChatResult};

/// Presentation data for a participant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Fails with [`ChatError::NotFound`] if `id` does not resolve.
    async fn get_user(&self, id: Uuid) -> ChatResult<UserProfile>;

    /// Resolves a login token to its user, [`ChatError::Unauthorized`] otherwise.
    async fn authenticate(&self, token: &str) -> ChatResult<UserProfile>;
}

pub struct SqliteIdentity {
    db_pool: SqlitePool,
}

impl SqliteIdentity {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }
}

type UserRow = (String, String, Option<String>, Option<String>);

fn to_profile((id, first_name, last_name, avatar_url): UserRow) -> ChatResult<UserProfile> {
    let id = Uuid::parse_str(&id).map_err(|e| ChatError::Corrupt(format!("user id {id}: {e}")))?;
    let display_name = format!("{first_name} {}", last_name.unwrap_or_default()).trim().to_owned();

    Ok(UserProfile { id, display_name, avatar_url })
}

#[async_trait]
impl IdentityService for SqliteIdentity {
    async fn get_user(&self, id: Uuid) -> ChatResult<UserProfile> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id,first_name,last_name,avatar_url FROM users WHERE id=?")
                .bind(id.to_string())
                .fetch_optional(&self.db_pool)
                .await?;

        to_profile(row.ok_or_else(|| ChatError::not_found(format!("user {id}")))?)
    }

    async fn authenticate(&self, token: &str) -> ChatResult<UserProfile> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT u.id,u.first_name,u.last_name,u.avatar_url FROM auth_tokens t \
             JOIN users u ON u.id=t.user_id WHERE t.token=?",
        )
        .bind(token)
        .fetch_optional(&self.db_pool)
        .await?;

        to_profile(row.ok_or(ChatError::Unauthorized)?)
    }
}
