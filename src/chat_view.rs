use std::collections::HashSet;
use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use serde::Deserialize;

use crate::error::ApiError;
use crate::manager::{chat_manager::ChatManager, ChatRoom, User};
use crate::utils::{self, JsonBody};
use crate::AppState;

const MISSING_FIELDS: &str = "Please Fill all the feilds";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessChatForm {
    #[serde(default, deserialize_with = "utils::opt_id")]
    user_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct GroupForm {
    name: Option<String>,
    #[serde(default, deserialize_with = "utils::opt_id_list")]
    users: Option<Vec<i64>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameForm {
    #[serde(default, deserialize_with = "utils::opt_id")]
    chat_id: Option<i64>,
    chat_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberForm {
    #[serde(default, deserialize_with = "utils::opt_id")]
    chat_id: Option<i64>,
    #[serde(default, deserialize_with = "utils::opt_id")]
    user_id: Option<i64>,
}

impl MemberForm {
    fn ids(&self) -> Result<(i64, i64), ApiError> {
        match (self.chat_id, self.user_id) {
            (Some(chat_id), Some(user_id)) => Ok((chat_id, user_id)),
            _ => Err(ApiError::bad_request(MISSING_FIELDS)),
        }
    }
}

pub async fn access_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<AccessChatForm>,
) -> Result<Json<ChatRoom>, ApiError> {
    let Some(other) = form.user_id else {
        tracing::debug!("userId param not sent with request");
        return Err(ApiError::bad_request("UserId param not sent with request"));
    };
    if other == user.id {
        return Err(ApiError::bad_request("Cannot start a chat with yourself"));
    }

    let chat = ChatManager::new(&state.pool)
        .access_chat(user.id, other)
        .await?;
    Ok(Json(chat))
}

pub async fn fetch_chats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<ChatRoom>>, ApiError> {
    Ok(Json(ChatManager::new(&state.pool).list_chats(user.id).await?))
}

pub async fn create_group_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    JsonBody(form): JsonBody<GroupForm>,
) -> Result<Json<ChatRoom>, ApiError> {
    let (Some(name), Some(mut members)) = (
        form.name.as_deref().map(str::trim).filter(|n| !n.is_empty()),
        form.users,
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };

    // the admin joins on their own, only distinct others count
    let mut seen = HashSet::new();
    members.retain(|&id| id != user.id && seen.insert(id));
    if members.len() < 2 {
        return Err(ApiError::bad_request(
            "More than 2 users are required to form a group chat",
        ));
    }

    let chat = ChatManager::new(&state.pool)
        .new_group(name, &members, user.id)
        .await?;
    tracing::info!(chat_id = chat.id, admin = user.id, "created group chat");
    Ok(Json(chat))
}

// Group mutations do not check that the caller is the admin or even a member.

pub async fn rename_group(
    State(state): State<Arc<AppState>>,
    JsonBody(form): JsonBody<RenameForm>,
) -> Result<Json<ChatRoom>, ApiError> {
    let (Some(chat_id), Some(name)) = (
        form.chat_id,
        form.chat_name.as_deref().map(str::trim).filter(|n| !n.is_empty()),
    ) else {
        return Err(ApiError::bad_request(MISSING_FIELDS));
    };

    Ok(Json(
        ChatManager::new(&state.pool)
            .rename_group(chat_id, name)
            .await?,
    ))
}

pub async fn add_to_group(
    State(state): State<Arc<AppState>>,
    JsonBody(form): JsonBody<MemberForm>,
) -> Result<Json<ChatRoom>, ApiError> {
    let (chat_id, user_id) = form.ids()?;
    Ok(Json(
        ChatManager::new(&state.pool)
            .add_to_group(chat_id, user_id)
            .await?,
    ))
}

pub async fn remove_from_group(
    State(state): State<Arc<AppState>>,
    JsonBody(form): JsonBody<MemberForm>,
) -> Result<Json<ChatRoom>, ApiError> {
    let (chat_id, user_id) = form.ids()?;
    Ok(Json(
        ChatManager::new(&state.pool)
            .remove_from_group(chat_id, user_id)
            .await?,
    ))
}
