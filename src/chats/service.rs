use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{error, info};
use uuid::Uuid;

use crate::identity::{IdentityService, UserProfile};

use super::{
    error::{ChatError, ChatResult},
    events::ReceiveMessage,
    relay::Relay,
    store::{ConversationStore, Message, validate_text},
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub chat_id: Uuid,
    pub participants: [UserProfile; 2],
    pub messages: Vec<Message>,
    pub current_user: UserProfile,
    pub other_user: UserProfile,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListItem {
    pub chat_id: Uuid,
    /// None when the other account no longer resolves.
    pub other_user: Option<UserProfile>,
    pub last_message: Option<LastMessage>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub message_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Outcome of a live message that was stored.
#[derive(Debug)]
pub struct LiveDelivery {
    pub message: Message,
    /// Connections that got it live. Zero is fine.
    pub delivered: usize,
}

/// Ties the conversation store, the live relay and identity lookups together.
#[derive(Clone)]
pub struct ChatService {
    store: ConversationStore,
    relay: Relay,
    identity: Arc<dyn IdentityService>,
}

impl ChatService {
    pub fn new(store: ConversationStore, relay: Relay, identity: Arc<dyn IdentityService>) -> Self {
        Self { store, relay, identity }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn identity(&self) -> &dyn IdentityService {
        self.identity.as_ref()
    }

    pub async fn open_conversation(&self, current_user: Uuid, target_user: &str) -> ChatResult<ConversationView> {
        let target = parse_participant(target_user)?;
        if target == current_user {
            return Err(ChatError::validation("cannot open a conversation with yourself"));
        }

        // resolve both before creating anything so an unknown target leaves no row behind
        let other_user = self.identity.get_user(target).await?;
        let current_user = self.identity.get_user(current_user).await?;

        let conversation = self.store.find_or_create(current_user.id, other_user.id).await?;

        let participants = if conversation.participants.0 == current_user.id {
            [current_user.clone(), other_user.clone()]
        } else {
            [other_user.clone(), current_user.clone()]
        };

        Ok(ConversationView {
            chat_id: conversation.id,
            participants,
            messages: conversation.messages,
            current_user,
            other_user,
        })
    }

    pub async fn list_conversations(&self, current_user: Uuid) -> ChatResult<Vec<ConversationListItem>> {
        let me = self.identity.get_user(current_user).await?;
        let summaries = self.store.list_for_participant(current_user).await?;

        let mut items = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let other_user = match self.identity.get_user(summary.other).await {
                Ok(user) => Some(user),
                Err(ChatError::NotFound(_)) => None,
                Err(e) => return Err(e),
            };

            let last_message = summary.last_message.map(|msg| {
                let sender_name = if msg.sender_id == me.id {
                    Some(me.display_name.clone())
                } else {
                    other_user.as_ref().map(|u| u.display_name.clone())
                };
                LastMessage {
                    text: msg.text,
                    sender_id: msg.sender_id,
                    sender_name,
                    timestamp: msg.created_at,
                }
            });

            items.push(ConversationListItem {
                chat_id: summary.id,
                other_user,
                last_message,
                updated_at: summary.updated_at,
                message_count: summary.message_count,
            });
        }

        Ok(items)
    }

    /// Stores a message sent over a live connection and fans it out to the pair's room.
    ///
    /// Malformed input and unknown receivers are rejected before either effect.
    /// After that the relay publish happens whether or not the store write
    /// succeeded; a store failure is still returned to the caller.
    pub async fn handle_incoming_live_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
    ) -> ChatResult<LiveDelivery> {
        validate_text(text)?;
        if sender_id == receiver_id {
            return Err(ChatError::validation("cannot send a message to yourself"));
        }
        self.identity.get_user(receiver_id).await?;

        let persisted = self.persist(sender_id, receiver_id, text).await;
        let created_at = match &persisted {
            Ok(message) => message.created_at,
            Err(e) => {
                error!(%sender_id, %receiver_id, "failed to store live message: {e}");
                OffsetDateTime::now_utc()
            }
        };

        let delivered = self.relay.send(ReceiveMessage {
            sender_id,
            receiver_id,
            text: text.to_owned(),
            created_at,
        });
        info!(%sender_id, %receiver_id, delivered, "live message");

        persisted.map(|message| LiveDelivery { message, delivered })
    }

    async fn persist(&self, sender_id: Uuid, receiver_id: Uuid, text: &str) -> ChatResult<Message> {
        let conversation_id = self.store.find_or_create_id(sender_id, receiver_id).await?;
        self.store.append(conversation_id, sender_id, text).await
    }
}

pub fn parse_participant(id: &str) -> ChatResult<Uuid> {
    Uuid::parse_str(id.trim()).map_err(|_| ChatError::validation(format!("invalid user id format: {id:?}")))
}
