use axum::{Json, debug_handler, extract::{Path, State}};
use serde::Serialize;

use crate::{AppResult, AppState, auth::CurrentUser};

use super::{ChatService, service::ConversationView};

#[derive(Serialize)]
pub(crate) struct OpenConversationResponse {
    success: bool,
    #[serde(flatten)]
    conversation: ConversationView,
}

#[debug_handler(state = AppState)]
pub(crate) async fn open_conversation(
    State(chats): State<ChatService>,
    CurrentUser(user): CurrentUser,
    Path(target_user_id): Path<String>,
) -> AppResult<Json<OpenConversationResponse>> {
    let conversation = chats.open_conversation(user.id, &target_user_id).await?;

    Ok(Json(OpenConversationResponse { success: true, conversation }))
}
