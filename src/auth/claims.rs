use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. A closed set: every authorization branch matches on it
/// exhaustively, so a future third variant cannot silently fall through to
/// non-admin semantics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn is_admin(self) -> bool {
        match self {
            Self::Admin => true,
            Self::User => false,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

/// JWT payload used for authentication, on both the REST and realtime paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // user ID
    pub username: String, // immutable login name
    pub role: Role,       // visibility scope
    pub iat: usize,       // issued at (unix timestamp)
    pub exp: usize,       // expires at (unix timestamp)
    pub iss: String,      // issuer
    pub aud: String,      // audience
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }

    #[test]
    fn default_role_is_user() {
        assert_eq!(Role::default(), Role::User);
        assert!(!Role::default().is_admin());
    }
}
