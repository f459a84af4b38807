use axum::Router;

use crate::state::AppState;

pub mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod service;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
