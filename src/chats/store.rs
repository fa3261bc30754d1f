use serde::Serialize;
use sqlx::SqlitePool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{
    error::{ChatError, ChatResult},
    room_id::{normalize, room_id},
};

pub const MAX_TEXT_LEN: usize = 2000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    #[serde(skip)]
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: Uuid,
    /// Normalized: `participants.0` sorts before `participants.1`.
    pub participants: (Uuid, Uuid),
    pub messages: Vec<Message>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub other: Uuid,
    pub last_message: Option<Message>,
    pub message_count: i64,
    pub updated_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: String,
    participant_lo: String,
    participant_hi: String,
    updated_at: i64,
    message_count: i64,
    last_id: Option<String>,
    last_sender_id: Option<String>,
    last_text: Option<String>,
    last_created_at: Option<i64>,
}

/// Durable pairwise conversations and their message history.
#[derive(Clone)]
pub struct ConversationStore {
    db_pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Returns the conversation for `{a, b}` with its full history, creating it
    /// on first contact.
    pub async fn find_or_create(&self, a: Uuid, b: Uuid) -> ChatResult<Conversation> {
        let (id, updated_at) = self.ensure(a, b).await?;

        Ok(Conversation {
            id,
            participants: normalize(a, b),
            messages: self.messages(id).await?,
            updated_at: from_micros(updated_at)?,
        })
    }

    /// Like [`ConversationStore::find_or_create`] without loading messages.
    pub async fn find_or_create_id(&self, a: Uuid, b: Uuid) -> ChatResult<Uuid> {
        Ok(self.ensure(a, b).await?.0)
    }

    /// Concurrent callers for the same pair race on the unique `room_key`; the
    /// losing insert is a no-op and every caller reads back the same row.
    async fn ensure(&self, a: Uuid, b: Uuid) -> ChatResult<(Uuid, i64)> {
        if a == b {
            return Err(ChatError::validation("a conversation needs two distinct participants"));
        }

        let (lo, hi) = normalize(a, b);
        let room_key = room_id(a, b);
        let now = now_micros()?;

        let inserted = sqlx::query(
            "INSERT INTO conversations (id,room_key,participant_lo,participant_hi,created_at,updated_at) \
             VALUES (?,?,?,?,?,?) ON CONFLICT(room_key) DO NOTHING",
        )
        .bind(Uuid::now_v7().to_string())
        .bind(&room_key)
        .bind(lo.to_string())
        .bind(hi.to_string())
        .bind(now)
        .bind(now)
        .execute(&self.db_pool)
        .await?;
        if inserted.rows_affected() > 0 {
            debug!(%lo, %hi, "created conversation");
        }

        let (id, updated_at): (String, i64) =
            sqlx::query_as("SELECT id,updated_at FROM conversations WHERE room_key=?")
                .bind(&room_key)
                .fetch_one(&self.db_pool)
                .await?;

        Ok((parse_uuid(&id)?, updated_at))
    }

    pub async fn append(&self, conversation_id: Uuid, sender_id: Uuid, text: &str) -> ChatResult<Message> {
        validate_text(text)?;

        let Some((lo, hi)): Option<(String, String)> =
            sqlx::query_as("SELECT participant_lo,participant_hi FROM conversations WHERE id=?")
                .bind(conversation_id.to_string())
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(ChatError::not_found(format!("conversation {conversation_id}")));
        };

        let sender = sender_id.to_string();
        if sender != lo && sender != hi {
            return Err(ChatError::validation("sender is not a participant of this conversation"));
        }

        let id = Uuid::now_v7();
        let mut tx = self.db_pool.begin().await?;

        // created_at never goes backwards within a conversation, even if the clock does.
        let (created_at,): (i64,) = sqlx::query_as(
            "INSERT INTO messages (id,conversation_id,sender_id,text,created_at) \
             VALUES (?1,?2,?3,?4,MAX(?5,COALESCE((SELECT MAX(created_at) FROM messages WHERE conversation_id=?2),0))) \
             RETURNING created_at",
        )
        .bind(id.to_string())
        .bind(conversation_id.to_string())
        .bind(&sender)
        .bind(text)
        .bind(now_micros()?)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE conversations SET updated_at=MAX(updated_at,?) WHERE id=?")
            .bind(created_at)
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Message {
            id,
            conversation_id,
            sender_id,
            text: text.to_owned(),
            created_at: from_micros(created_at)?,
        })
    }

    /// Every conversation `participant` is in, most recently active first.
    pub async fn list_for_participant(&self, participant: Uuid) -> ChatResult<Vec<ConversationSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT c.id AS id, c.participant_lo AS participant_lo, c.participant_hi AS participant_hi, c.updated_at AS updated_at, \
                    (SELECT COUNT(*) FROM messages WHERE conversation_id=c.id) AS message_count, \
                    m.id AS last_id, m.sender_id AS last_sender_id, m.text AS last_text, m.created_at AS last_created_at \
             FROM conversations c \
             LEFT JOIN messages m ON m.seq=(SELECT MAX(seq) FROM messages WHERE conversation_id=c.id) \
             WHERE c.participant_lo=?1 OR c.participant_hi=?1 \
             ORDER BY c.updated_at DESC, c.rowid DESC",
        )
        .bind(participant.to_string())
        .fetch_all(&self.db_pool)
        .await?;

        let me = participant.to_string();
        rows.into_iter()
            .map(|row| -> ChatResult<ConversationSummary> {
                let id = parse_uuid(&row.id)?;
                let other = if row.participant_lo == me { &row.participant_hi } else { &row.participant_lo };

                let last_message = match (row.last_id, row.last_sender_id, row.last_text, row.last_created_at) {
                    (Some(msg_id), Some(sender_id), Some(text), Some(created_at)) => Some(Message {
                        id: parse_uuid(&msg_id)?,
                        conversation_id: id,
                        sender_id: parse_uuid(&sender_id)?,
                        text,
                        created_at: from_micros(created_at)?,
                    }),
                    _ => None,
                };

                Ok(ConversationSummary {
                    id,
                    other: parse_uuid(other)?,
                    last_message,
                    message_count: row.message_count,
                    updated_at: from_micros(row.updated_at)?,
                })
            })
            .collect()
    }

    pub async fn get_history(&self, conversation_id: Uuid) -> ChatResult<Vec<Message>> {
        if sqlx::query("SELECT 1 FROM conversations WHERE id=?")
            .bind(conversation_id.to_string())
            .fetch_optional(&self.db_pool)
            .await?
            .is_none()
        {
            return Err(ChatError::not_found(format!("conversation {conversation_id}")));
        }

        self.messages(conversation_id).await
    }

    async fn messages(&self, conversation_id: Uuid) -> ChatResult<Vec<Message>> {
        let msgs: Vec<(String, String, String, i64)> =
            sqlx::query_as("SELECT id,sender_id,text,created_at FROM messages WHERE conversation_id=? ORDER BY seq")
                .bind(conversation_id.to_string())
                .fetch_all(&self.db_pool)
                .await?;

        msgs.into_iter()
            .map(|(id, sender_id, text, created_at)| -> ChatResult<Message> {
                Ok(Message {
                    id: parse_uuid(&id)?,
                    conversation_id,
                    sender_id: parse_uuid(&sender_id)?,
                    text,
                    created_at: from_micros(created_at)?,
                })
            })
            .collect()
    }
}

pub fn validate_text(text: &str) -> ChatResult<()> {
    if text.trim().is_empty() {
        return Err(ChatError::validation("message text must not be empty"));
    }
    if text.chars().count() > MAX_TEXT_LEN {
        return Err(ChatError::validation(format!("message text is longer than {MAX_TEXT_LEN} characters")));
    }
    Ok(())
}

fn now_micros() -> ChatResult<i64> {
    let micros = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000;
    i64::try_from(micros).map_err(|_| ChatError::Corrupt(format!("clock out of range: {micros}us")))
}

fn from_micros(micros: i64) -> ChatResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(micros) * 1_000)
        .map_err(|e| ChatError::Corrupt(format!("timestamp {micros}: {e}")))
}

fn parse_uuid(s: &str) -> ChatResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| ChatError::Corrupt(format!("id {s}: {e}")))
}
