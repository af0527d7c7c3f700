use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::rejected;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::security::AuthenticatedUser;
use crate::services::conversation::ConversationOrchestrator;
use crate::utils::error::ChatError;

/// `POST /api/chat`: one full turn, answered as a single JSON body.
pub async fn chat_handler(
    State(orchestrator): State<Arc<ConversationOrchestrator>>,
    user: AuthenticatedUser,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ChatError> {
    let Json(request) = payload.map_err(rejected)?;

    info!(
        "Chat request: user={}, session={:?}, message_len={}, custom_prompt={}",
        user.id(),
        request.session_id,
        request.message.len(),
        request.system_prompt.is_some()
    );

    let response = orchestrator.handle_message(user.id(), request).await?;
    Ok(Json(response))
}
