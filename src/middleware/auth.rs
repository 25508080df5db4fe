use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, services::order_service::CartOwner};

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Whoever is checking out: a signed-in user when a bearer token is present,
/// otherwise the guest session named by `x-session-id`.
#[derive(Debug, Clone)]
pub struct CartIdentity(pub CartOwner);

impl<S> FromRequestParts<S> for CartIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let secret = std::env::var("JWT_SECRET").ok();
        if let Some(user) = bearer_user(&parts.headers, secret.as_deref())? {
            return Ok(CartIdentity(CartOwner::User(user.user_id)));
        }

        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Missing Authorization or {SESSION_HEADER} header"
                ))
            })?;
        Ok(CartIdentity(CartOwner::Guest(session.to_string())))
    }
}

/// `Ok(None)` when no Authorization header was sent at all, or when no signing
/// secret is configured and every caller is a guest.
fn bearer_user(headers: &HeaderMap, secret: Option<&str>) -> Result<Option<AuthUser>, AppError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

    if !auth_str.starts_with("Bearer ") {
        return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
    }
    let token = auth_str.trim_start_matches("Bearer ").trim();

    let Some(secret) = secret else {
        tracing::debug!("JWT_SECRET unset, ignoring bearer token");
        return Ok(None);
    };

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::BadRequest("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::BadRequest("Invalid user id in token".into()))?;

    Ok(Some(AuthUser { user_id }))
}
