use serde::Deserialize;

use crate::auth::claims::Role;

/// Request body for admin-side account creation.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<Role>,
}
