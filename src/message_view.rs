use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;

use crate::error::ApiError;
use crate::manager::{message_manager::MessageManager, ChatMessage, User};
use crate::utils::{self, JsonBody};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageForm {
    content: Option<String>,
    #[serde(default, deserialize_with = "utils::opt_id")]
    chat_id: Option<i64>,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<MessageForm>,
) -> Result<Json<ChatMessage>, ApiError> {
    let (Some(content), Some(chat_id)) = (
        form.content.as_deref().filter(|c| !c.is_empty()),
        form.chat_id,
    ) else {
        tracing::debug!("invalid data passed into request");
        return Err(ApiError::bad_request("Invalid data passed into request"));
    };

    let message = MessageManager::new(&state.pool)
        .new_message(&user, chat_id, content)
        .await?;
    Ok(Json(message))
}

pub async fn all_messages(
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<String>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    let chat_id = chat_id
        .parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("Invalid chat id {chat_id:?}")))?;

    Ok(Json(
        MessageManager::new(&state.pool)
            .list_messages(chat_id)
            .await?,
    ))
}
