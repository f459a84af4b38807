use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use crate::auth::claims::{Claims, Role};
use crate::auth::jwt::JwtKeys;
use crate::error::ApiError;

/// Extracts and validates the bearer token, yielding the caller's claims.
pub struct AuthUser(pub Claims);

/// Like [`AuthUser`], but additionally requires the admin role.
pub struct AdminUser(pub Claims);

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".into()))?;

    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let token = bearer_token(parts)?;
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            ApiError::Unauthorized("Invalid or expired token".into())
        })?;
        Ok(AuthUser(claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        match claims.role {
            Role::Admin => Ok(AdminUser(claims)),
            Role::User => {
                warn!(user_id = %claims.sub, "admin endpoint denied");
                Err(ApiError::Forbidden("Admin access required".into()))
            }
        }
    }
}
