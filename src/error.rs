use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth;
use crate::manager::{chat_manager, user_manager};

static HIDE_DETAILS: AtomicBool = AtomicBool::new(false);

/// Drops the `stack` field from every error body. Set once at startup.
pub fn hide_details(hide: bool) {
    HIDE_DETAILS.store(hide, Ordering::Relaxed);
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<user_manager::Error> for ApiError {
    fn from(err: user_manager::Error) -> Self {
        use user_manager::Error;
        match err {
            Error::EmailTaken => Self::BadRequest(err.to_string()),
            Error::WrongPassword => Self::Unauthorized(err.to_string()),
            Error::HashError(e) => Self::Internal(e.to_string()),
            Error::DatabaseError(e) => Self::Database(e),
        }
    }
}

impl From<chat_manager::Error> for ApiError {
    fn from(err: chat_manager::Error) -> Self {
        use chat_manager::Error;
        match err {
            Error::DoesNotExist => Self::NotFound(err.to_string()),
            Error::Rejected(message) => Self::BadRequest(message),
            Error::DatabaseError(e) => Self::Database(e),
        }
    }
}

impl From<auth::Error> for ApiError {
    fn from(err: auth::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed");
        }

        let body = ErrorBody {
            message: self.to_string(),
            stack: (!HIDE_DETAILS.load(Ordering::Relaxed)).then(|| format!("{self:?}")),
        };
        (status, Json(body)).into_response()
    }
}

/// Router fallback.
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Not Found - {uri}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            ApiError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::unauthorized("x").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from(chat_manager::Error::DoesNotExist).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(chat_manager::Error::DatabaseError(sqlx::Error::RowNotFound))
                .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::from(user_manager::Error::EmailTaken).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_carries_message() {
        let response = ApiError::from(chat_manager::Error::DoesNotExist).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Chat Not Found");
    }

    #[tokio::test]
    async fn fallback_names_the_path() {
        let uri: Uri = "/api/nothing?x=1".parse().unwrap();
        let body = body_json(not_found(uri).await.into_response()).await;
        assert_eq!(body["message"], "Not Found - /api/nothing?x=1");
    }
}
