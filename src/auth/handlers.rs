use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::auth::{
    dto::{AuthResponse, LoginRequest, RegisterRequest},
    jwt::JwtKeys,
    password::hash_password,
    service::{is_valid_email, validate_user},
};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::User;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.username = payload.username.trim().to_string();
    payload.email = payload.email.trim().to_lowercase();

    if payload.username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Validation("Password too short".into()));
    }

    if User::exists(&state.db, &payload.username, &payload.email).await? {
        warn!(username = %payload.username, "username or email already registered");
        return Err(ApiError::Conflict("Username or email already exists".into()));
    }

    let hash = hash_password(&payload.password)?;
    let role = payload.role.unwrap_or_default();
    let user = User::create(&state.db, &payload.username, &payload.email, &hash, role).await?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(&user)?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(Json(AuthResponse { access_token, user }))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let identifier = payload.username.trim();

    // Never reveal which of username/password was wrong.
    let user = validate_user(&state.db, identifier, &payload.password)
        .await?
        .ok_or_else(|| {
            warn!(identifier = %identifier, "login rejected");
            ApiError::Unauthorized("Invalid credentials".into())
        })?;

    let keys = JwtKeys::from_ref(&state);
    let access_token = keys.sign(&user)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse { access_token, user }))
}
