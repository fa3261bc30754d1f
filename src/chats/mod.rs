mod conversation;
mod error;
mod list;

pub mod events;
pub mod relay;
pub mod room_id;
pub mod service;
pub mod store;
pub mod ws;

use axum::{Router, routing::get};

use crate::AppState;

pub use error::{ChatError, ChatResult};
pub use relay::{ConnectionId, Relay};
pub use room_id::room_id;
pub use service::ChatService;
pub use store::ConversationStore;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/{target_user_id}", get(conversation::open_conversation))
        .route("/chats", get(list::list_conversations))
        .route("/ws", get(ws::chat_ws))
}
