//! Caller authentication.
//!
//! - [`AuthUser`]: validates the `Authorization: Bearer <JWT>` header issued by
//!   the application's auth service and resolves the caller's tenant scope
//!   and roles.
//! - [`WorkerAuth`]: accepts trusted schedulers presenting the shared worker
//!   token via `X-Worker-Token` or `Authorization: Bearer`.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use flock_common::error::AppError;
use flock_common::types::CallerScope;

use crate::state::AppState;

/// JWT claims stored in the token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject: the user's UUID
    pub sub: String,
    /// Expiration time (UNIX timestamp)
    pub exp: i64,
    /// Issued at (UNIX timestamp)
    pub iat: i64,
    /// Congregation the user belongs to; absent for platform staff
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_global_admin: bool,
}

/// Authenticated user extracted from a JWT.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub scope: CallerScope,
    pub claims: Claims,
}

/// Encode a JWT carrying a caller scope.
pub fn encode_jwt(scope: &CallerScope, secret: &str, expiry_hours: u64) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::hours(expiry_hours as i64);

    let claims = Claims {
        sub: scope.user_id.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
        tenant_id: scope.tenant_id,
        roles: scope.roles.clone(),
        is_global_admin: scope.is_global_admin,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Auth(format!("Failed to encode JWT: {}", e)))
}

/// Decode and validate a JWT token.
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

    Ok(token_data.claims)
}

impl TryFrom<Claims> for AuthUser {
    type Error = AppError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Auth("Invalid user ID in token".to_string()))?;

        Ok(AuthUser {
            scope: CallerScope {
                user_id,
                tenant_id: claims.tenant_id,
                roles: claims.roles.clone(),
                is_global_admin: claims.is_global_admin,
            },
            claims,
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            AppError::Auth("Missing or invalid Authorization header. Use 'Bearer <JWT>'".to_string())
        })?;

        let claims = decode_jwt(token, &state.config.jwt_secret)?;
        AuthUser::try_from(claims)
    }
}

/// Marker for requests authenticated with the shared worker token.
#[derive(Debug, Clone, Copy)]
pub struct WorkerAuth;

impl FromRequestParts<AppState> for WorkerAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let presented = parts
            .headers
            .get("x-worker-token")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .or_else(|| bearer_token(parts));

        match presented {
            Some(token) if token_matches(token, &state.config.worker_token) => Ok(WorkerAuth),
            _ => Err(AppError::Auth("Invalid worker token".to_string())),
        }
    }
}

/// Constant-time comparison; an empty configured token never matches.
fn token_matches(presented: &str, expected: &str) -> bool {
    if expected.is_empty() || presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
