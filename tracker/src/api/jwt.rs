use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{Role, user};
use crate::error::AppError;
use crate::policy::{self, AdminOnly, Identity, OfficerOnly, StaffOnly};

use super::{ApiErr, AppState};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id (UUID, stored as string in JWT)
    pub sub: Uuid,
    pub username: String,
    pub role: Role,
    /// Unix timestamp expiry
    pub exp: u64,
}

impl Claims {
    pub fn for_user(user: &user::Model, expiry_hours: u64) -> Self {
        Self {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            exp: (Utc::now().timestamp().max(0) as u64) + expiry_hours * 3600,
        }
    }
}

/// Why a bearer token was refused.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Access token is required")]
    Missing,
    #[error("Invalid token")]
    Malformed,
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token signature")]
    UnknownSigner,
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        AppError::unauthorized(e.to_string())
    }
}

pub fn encode_jwt(claims: &Claims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, TokenError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::UnknownSigner,
        _ => TokenError::Malformed,
    })?;
    Ok(data.claims)
}

fn extract_bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the bearer token and resolve it to an active user. A valid token
/// for a deactivated account is still refused.
async fn identify(parts: &Parts, state: &AppState) -> Result<Identity, AppError> {
    let token = extract_bearer(parts).ok_or(TokenError::Missing)?;
    let claims = decode_jwt(token, &state.jwt_secret)?;
    policy::resolve_identity(&state.db, claims.sub).await
}

/// Extractor: any authenticated, active user.
pub struct CurrentUser(pub Identity);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        Ok(CurrentUser(identify(parts, &state).await?))
    }
}

/// Extractor: admin only.
pub struct AdminUser(pub AdminOnly);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let identity = identify(parts, &state).await?;
        Ok(AdminUser(identity.require_admin()?))
    }
}

/// Extractor: admin or supervisor.
pub struct StaffUser(pub StaffOnly);

impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let identity = identify(parts, &state).await?;
        Ok(StaffUser(identity.require_staff()?))
    }
}

/// Extractor: petugas only.
pub struct OfficerUser(pub OfficerOnly);

impl<S> FromRequestParts<S> for OfficerUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = ApiErr;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let identity = identify(parts, &state).await?;
        Ok(OfficerUser(identity.require_officer()?))
    }
}
