use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::ApiError;
use crate::manager::{
    user_manager::{NewUser, UserManager},
    PublicUser, User,
};
use crate::utils::JsonBody;
use crate::AppState;

#[derive(Deserialize)]
pub struct RegisterForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    pic: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    search: Option<String>,
}

/// Profile plus a fresh bearer token, returned by register and login.
#[derive(Serialize, Debug)]
pub struct AuthResponse {
    #[serde(rename = "_id")]
    id: i64,
    name: String,
    email: String,
    pic: String,
    token: String,
}

impl AuthResponse {
    fn issue(user: User, state: &AppState) -> Result<Self, ApiError> {
        let token = auth::issue_token(user.id, &state.config)?;
        Ok(Self {
            id: user.id,
            name: user.name,
            email: user.email,
            pic: user.pic,
            token,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    JsonBody(form): JsonBody<RegisterForm>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let (Some(name), Some(email), Some(password)) = (
        non_empty(&form.name),
        non_empty(&form.email),
        form.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::bad_request("Please Enter all the Fields"));
    };

    let user = UserManager::new(&state.pool)
        .with_cost(state.config.bcrypt_cost)
        .new_user(NewUser {
            name,
            email,
            password,
            pic: non_empty(&form.pic),
        })
        .await?;
    tracing::info!(user_id = user.id, "registered user");

    Ok((StatusCode::CREATED, Json(AuthResponse::issue(user, &state)?)))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    JsonBody(form): JsonBody<LoginForm>,
) -> Result<Json<AuthResponse>, ApiError> {
    let email = form.email.unwrap_or_default();
    let password = form.password.unwrap_or_default();
    let user = UserManager::new(&state.pool)
        .get_user(email.trim(), &password)
        .await?;

    Ok(Json(AuthResponse::issue(user, &state)?))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<PublicUser>>, ApiError> {
    let users = UserManager::new(&state.pool)
        .search_user(query.search.as_deref(), user.id)
        .await?;
    Ok(Json(users.into_iter().map(Into::into).collect()))
}
