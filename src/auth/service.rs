use lazy_static::lazy_static;
use regex::Regex;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::auth::claims::Role;
use crate::auth::password::{hash_password, verify_password};
use crate::config::AdminBootstrap;
use crate::users::repo::User;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Pure lookup + hash comparison; no side effects. `identifier` may be a
/// username or an email. Returns `None` on no match or wrong password, without
/// distinguishing the two.
pub async fn validate_user(
    db: &PgPool,
    identifier: &str,
    password: &str,
) -> anyhow::Result<Option<User>> {
    let Some(user) = User::find_by_identifier(db, identifier).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash)? {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

/// Idempotent boot-time seeding: creates the reserved admin account if no user
/// with that username exists yet. A convenience bootstrap, not part of the
/// security contract.
#[instrument(skip(db, bootstrap))]
pub async fn ensure_default_account(db: &PgPool, bootstrap: &AdminBootstrap) -> anyhow::Result<User> {
    if let Some(existing) = User::find_by_username(db, &bootstrap.username).await? {
        return Ok(existing);
    }
    let hash = hash_password(&bootstrap.password)?;
    let user = User::create(db, &bootstrap.username, &bootstrap.email, &hash, Role::Admin).await?;
    info!(username = %user.username, "default admin account created");
    Ok(user)
}
