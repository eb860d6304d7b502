use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::AppState;

/// Bearer token claims. `sub` is the owner id every wallet and transaction is
/// scoped to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            AuthError::MissingToken => "Authentication required",
            AuthError::InvalidToken => "Invalid or expired token",
        };
        tracing::debug!(?self, "Rejected unauthenticated request");
        let status = StatusCode::UNAUTHORIZED;
        (
            status,
            Json(json!({ "message": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}

pub fn issue_token(
    secret: &str,
    owner_id: Uuid,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: owner_id,
        iat: now,
        exp: now + ttl.as_secs() as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AuthError::InvalidToken)
}

/// Resolves the caller from an `Authorization: Bearer <jwt>` header.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Uuid, AuthError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;
    decode_token(secret, token).map(|claims| claims.sub)
}

/// Authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub owner_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let owner_id = authenticate(&parts.headers, &state.config.jwt_secret)?;
        Ok(AuthUser { owner_id })
    }
}
