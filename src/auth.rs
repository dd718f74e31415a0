use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::ApiError;
use crate::manager::user_manager::UserManager;
use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("token subject {0:?} is not a user id")]
    BadSubject(String),
    #[error("token lifetime of {0} days is out of range")]
    BadLifetime(i64),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn issue_token(user_id: i64, config: &Config) -> Result<String, Error> {
    let now = Utc::now();
    let exp = Duration::try_days(config.jwt_ttl_days)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or(Error::BadLifetime(config.jwt_ttl_days))?;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    Ok(encode(&Header::default(), &claims, &key)?)
}

/// Checks signature and expiry, returns the user id the token was issued for.
pub fn verify_token(token: &str, config: &Config) -> Result<i64, Error> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let claims = decode::<Claims>(token, &key, &Validation::default())?.claims;
    claims
        .sub
        .parse()
        .map_err(|_| Error::BadSubject(claims.sub))
}

/// Requires `Authorization: Bearer <token>` and attaches the caller's
/// [`User`](crate::manager::User) to the request extensions.
pub async fn protect<B>(
    State(state): State<Arc<AppState>>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;

    let user_id = verify_token(token, &state.config).map_err(|e| {
        tracing::warn!("rejected token: {e}");
        ApiError::unauthorized("Not authorized, token failed")
    })?;

    let user = UserManager::new(&state.pool)
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!(user_id, "token for unknown user");
            ApiError::unauthorized("Not authorized, token failed")
        })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            jwt_secret: "test-secret".into(),
            ..Default::default()
        }
    }

    #[test]
    fn ok_token_round_trip() {
        let token = issue_token(42, &config()).unwrap();
        assert_eq!(verify_token(&token, &config()).unwrap(), 42);
    }

    #[test]
    fn err_token_signed_with_other_secret() {
        let other = Config {
            jwt_secret: "someone-else".into(),
            ..Default::default()
        };
        let token = issue_token(42, &other).unwrap();
        assert!(verify_token(&token, &config()).is_err());
    }

    #[test]
    fn err_tampered_token() {
        let mut token = issue_token(42, &config()).unwrap();
        token.push('x');
        assert!(verify_token(&token, &config()).is_err());
        assert!(verify_token("invalid.token.here", &config()).is_err());
    }

    #[test]
    fn err_expired_token() {
        let expired = Config {
            jwt_ttl_days: -1,
            ..config()
        };
        let token = issue_token(42, &expired).unwrap();
        assert!(verify_token(&token, &config()).is_err());
    }

    #[test]
    fn err_token_lifetime_out_of_range() {
        let forever = Config {
            jwt_ttl_days: 1_000_000_000_000_000,
            ..config()
        };
        assert!(matches!(
            issue_token(42, &forever),
            Err(Error::BadLifetime(1_000_000_000_000_000))
        ));
    }
}
