use axum::Router;

use crate::state::AppState;

pub mod events;
pub mod notifier;
pub mod reconnect;
pub mod registry;
pub mod socket;

pub fn router() -> Router<AppState> {
    socket::realtime_routes()
}
