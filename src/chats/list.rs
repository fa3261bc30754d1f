use axum::{Json, debug_handler, extract::State};
use serde::Serialize;

use crate::{AppResult, AppState, auth::CurrentUser};

use super::{ChatService, service::ConversationListItem};

#[derive(Serialize)]
pub(crate) struct ListConversationsResponse {
    success: bool,
    chats: Vec<ConversationListItem>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn list_conversations(
    State(chats): State<ChatService>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ListConversationsResponse>> {
    let chats = chats.list_conversations(user.id).await?;

    Ok(Json(ListConversationsResponse { success: true, chats }))
}
