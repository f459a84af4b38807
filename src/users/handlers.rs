use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::extractors::{AdminUser, AuthUser};
use crate::auth::password::hash_password;
use crate::auth::service::is_valid_email;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::dto::CreateUserRequest;
use crate::users::repo::User;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/profile", get(get_profile))
        .route("/users/:id", get(get_user).delete(remove_user))
}

#[instrument(skip(state, _admin))]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = User::list(&state.db).await?;
    Ok(Json(users))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Json(mut payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }
    if User::exists(&state.db, &payload.username, &payload.email).await? {
        warn!(username = %payload.username, "duplicate account");
        return Err(ApiError::Conflict("Username or email already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let role = payload.role.unwrap_or_default();
    let user = User::create(&state.db, &payload.username, &payload.email, &hash, role).await?;

    info!(user_id = %user.id, created_by = %claims.sub, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<User>, ApiError> {
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

#[instrument(skip(state, _admin))]
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn remove_user(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(user_id = %id, removed_by = %claims.sub, "user removed");
    Ok(StatusCode::NO_CONTENT)
}
