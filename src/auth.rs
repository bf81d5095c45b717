//! Password hashing and session principals.
//!
//! Passwords are hashed with argon2 and a per-password random salt.
//! Sessions are server-side records keyed by a random token; the
//! authenticated identity for a request is a [`Principal`].

use crate::error::{ChirpError, Result};
use crate::model::UserId;
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::Rng;

/// The authenticated identity associated with the current session.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
}

/// Hash a password with argon2 and a fresh random salt.
///
/// # Errors
///
/// Returns an error if hashing fails (an infrastructure fault, not a
/// property of the input).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ChirpError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored argon2 hash.
///
/// An unparseable stored hash counts as a failed verification rather
/// than an error; login must stay a yes/no question.
#[must_use]
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(hash) = PasswordHash::new(password_hash) else {
        tracing::error!("stored password hash is unparseable");
        return false;
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

/// Generate a random 128-bit session token, hex-encoded.
#[must_use]
pub fn generate_session_token() -> String {
    let token: u128 = rand::thread_rng().gen();
    format!("{token:032x}")
}

/// Validate a post-login redirect target (open-redirect guard).
///
/// Only same-origin, path-absolute targets are allowed: the value must
/// start with a single `/` and must not smuggle a scheme or an
/// authority (`//host`, `/\host`).
#[must_use]
pub fn is_safe_redirect_target(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\")
}

/// Pick the post-login destination: the requested target if safe,
/// otherwise the site root.
#[must_use]
pub fn login_destination(next: Option<&str>) -> &str {
    match next {
        Some(target) if is_safe_redirect_target(target) => target,
        _ => "/",
    }
}
