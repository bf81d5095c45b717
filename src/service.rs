//! Application service layer for the chirp microblog.
//!
//! One [`App`] wraps the storage layer and enforces the rules the
//! schema cannot: field validation, the generic login failure, the
//! self-follow ban, and content bounds. Route handlers and tests talk
//! to this layer, never to SQL.

use crate::auth::{self, Principal};
use crate::error::{ChirpError, Result};
use crate::model::{ProfileView, TweetId, TweetView, User, UserId};
use crate::storage::Storage;
use chrono::Duration;
use tracing::{debug, info};

/// Maximum tweet length in characters.
pub const MAX_TWEET_CHARS: usize = 280;

/// Default number of tweets returned per timeline page.
pub const DEFAULT_TIMELINE_LIMIT: usize = 50;

/// Usernames appear in URL path segments and HTTP headers, so the
/// charset is strict: ASCII letters, digits, `.`, `-`, `_` only.
fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// A registration request, straight from the form.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm: String,
}

/// The microblog application service.
pub struct App {
    storage: Storage,
    session_ttl: Duration,
}

impl App {
    #[must_use]
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            session_ttl: Duration::days(7),
        }
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Borrow the underlying storage (read paths the service does not
    /// wrap, and tests).
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    // =========================================================================
    // Accounts & sessions
    // =========================================================================

    /// Register a new account.
    ///
    /// The friendly pre-check lookups produce precise conflict messages,
    /// but the UNIQUE constraints in storage are authoritative: a race
    /// that slips past the pre-check still resolves to a single winner.
    ///
    /// # Errors
    ///
    /// `Validation` for missing fields or a password mismatch,
    /// `Conflict` for a taken username or email.
    pub fn register(&self, req: &RegisterRequest) -> Result<UserId> {
        if req.username.trim().is_empty()
            || req.email.trim().is_empty()
            || req.password.is_empty()
            || req.confirm.is_empty()
        {
            return Err(ChirpError::validation("All fields are required"));
        }
        if req.password != req.confirm {
            return Err(ChirpError::validation("Passwords do not match"));
        }
        if !is_valid_username(&req.username) {
            return Err(ChirpError::validation(
                "Username may only contain letters, digits, '.', '-', and '_'",
            ));
        }

        if self.storage.user_by_username(&req.username)?.is_some() {
            return Err(ChirpError::conflict("Username", &req.username));
        }
        if self.storage.user_by_email(&req.email)?.is_some() {
            return Err(ChirpError::conflict("Email", &req.email));
        }

        let password_hash = auth::hash_password(&req.password)?;
        let user_id = self
            .storage
            .create_user(&req.username, &req.email, &password_hash)?;

        info!(username = %req.username, "registered new user");
        Ok(user_id)
    }

    /// Log in and establish a session. Returns the session token.
    ///
    /// # Errors
    ///
    /// `InvalidCredentials` on any failure; the error never reveals
    /// whether the username or the password was wrong.
    pub fn login(&self, username: &str, password: &str) -> Result<String> {
        let user = self
            .storage
            .user_by_username(username)?
            .ok_or(ChirpError::InvalidCredentials)?;

        if !auth::verify_password(password, &user.password_hash) {
            debug!(username, "password verification failed");
            return Err(ChirpError::InvalidCredentials);
        }

        let token = auth::generate_session_token();
        self.storage
            .create_session(&token, user.id, self.session_ttl)?;
        info!(username, "login succeeded");
        Ok(token)
    }

    /// Clear a session. Idempotent; logging out twice is fine.
    ///
    /// # Errors
    ///
    /// Returns an error only on a storage fault.
    pub fn logout(&self, token: &str) -> Result<()> {
        self.storage.delete_session(token)
    }

    /// Resolve the principal for a session token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only on a storage fault.
    pub fn current_principal(&self, token: &str) -> Result<Option<Principal>> {
        let Some(session) = self.storage.session_by_token(token)? else {
            return Ok(None);
        };
        let Some(user) = self.storage.user_by_id(session.user_id)? else {
            return Ok(None);
        };
        Ok(Some(Principal {
            user_id: user.id,
            username: user.username,
        }))
    }

    // =========================================================================
    // Tweets & timelines
    // =========================================================================

    /// Post a tweet as the given user.
    ///
    /// # Errors
    ///
    /// `Validation` if the content is empty or over [`MAX_TWEET_CHARS`].
    pub fn post(&self, author: UserId, content: &str) -> Result<TweetId> {
        if content.trim().is_empty() {
            return Err(ChirpError::validation("Tweet content must not be empty"));
        }
        if content.chars().count() > MAX_TWEET_CHARS {
            return Err(ChirpError::validation(format!(
                "Tweet content must be at most {MAX_TWEET_CHARS} characters"
            )));
        }
        self.storage.insert_tweet(author, content)
    }

    /// Global timeline, newest first. This is the feed `GET /` serves.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage fault.
    pub fn timeline(&self) -> Result<Vec<TweetView>> {
        self.storage.timeline(DEFAULT_TIMELINE_LIMIT)
    }

    /// Personalized timeline: the user's own tweets plus tweets from
    /// everyone they follow, newest first, deduplicated.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage fault.
    pub fn followed_timeline(&self, user_id: UserId) -> Result<Vec<TweetView>> {
        self.storage.followed_timeline(user_id, DEFAULT_TIMELINE_LIMIT)
    }

    /// Profile page data for a username.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown username.
    pub fn profile(&self, username: &str) -> Result<ProfileView> {
        self.storage.profile(username, DEFAULT_TIMELINE_LIMIT)
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown username.
    pub fn user_by_username(&self, username: &str) -> Result<User> {
        self.storage
            .user_by_username(username)?
            .ok_or_else(|| ChirpError::not_found("User", username))
    }

    // =========================================================================
    // Follow graph
    // =========================================================================

    /// Follow a user. Idempotent: following twice leaves one edge.
    ///
    /// # Errors
    ///
    /// `SelfFollow` when actor and target are the same user.
    pub fn follow(&self, actor: UserId, target: UserId) -> Result<()> {
        if actor == target {
            return Err(ChirpError::SelfFollow);
        }
        self.storage.insert_follow(actor, target)?;
        Ok(())
    }

    /// Unfollow a user. Removing a missing edge is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage fault.
    pub fn unfollow(&self, actor: UserId, target: UserId) -> Result<()> {
        self.storage.delete_follow(actor, target)?;
        Ok(())
    }

    /// Membership test on the follow edge set.
    ///
    /// # Errors
    ///
    /// Returns an error on a storage fault.
    pub fn is_following(&self, actor: UserId, target: UserId) -> Result<bool> {
        self.storage.is_following(actor, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn app() -> App {
        App::new(Storage::open_memory().unwrap())
    }

    fn register_req(username: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: "pw".to_string(),
            confirm: "pw".to_string(),
        }
    }

    #[test]
    fn register_rejects_missing_fields() {
        let app = app();
        let mut req = register_req("alice");
        req.email = String::new();
        assert!(matches!(
            app.register(&req).unwrap_err(),
            ChirpError::Validation { .. }
        ));
    }

    #[test]
    fn register_rejects_unsafe_usernames() {
        let app = app();
        for bad in ["a\nb", "a b", "a/b", "a%b", "<alice>", "a\tb"] {
            let mut req = register_req("placeholder");
            req.username = bad.to_string();
            assert!(
                matches!(
                    app.register(&req).unwrap_err(),
                    ChirpError::Validation { .. }
                ),
                "username {bad:?} should be rejected"
            );
        }

        let mut req = register_req("ok");
        req.username = "a_b-c.9".to_string();
        assert!(app.register(&req).is_ok());
    }

    #[test]
    fn register_rejects_password_mismatch() {
        let app = app();
        let mut req = register_req("alice");
        req.confirm = "other".to_string();
        assert!(matches!(
            app.register(&req).unwrap_err(),
            ChirpError::Validation { .. }
        ));
    }

    #[test]
    fn register_twice_only_one_wins() {
        let app = app();
        app.register(&register_req("alice")).unwrap();

        let mut second = register_req("alice");
        second.email = "b@x.com".to_string();
        assert!(matches!(
            app.register(&second).unwrap_err(),
            ChirpError::Conflict {
                field: "Username",
                ..
            }
        ));
    }

    #[test]
    fn login_failure_is_generic() {
        let app = app();
        app.register(&register_req("alice")).unwrap();

        let wrong_password = app.login("alice", "wrong").unwrap_err();
        let unknown_user = app.login("nobody", "pw").unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[test]
    fn login_establishes_principal_and_logout_clears_it() {
        let app = app();
        let user_id = app.register(&register_req("alice")).unwrap();

        let token = app.login("alice", "pw").unwrap();
        let principal = app.current_principal(&token).unwrap().unwrap();
        assert_eq!(principal.user_id, user_id);
        assert_eq!(principal.username, "alice");

        app.logout(&token).unwrap();
        assert!(app.current_principal(&token).unwrap().is_none());
        // Logging out again is a no-op.
        app.logout(&token).unwrap();
    }

    #[test]
    fn post_rejects_empty_content() {
        let app = app();
        let user_id = app.register(&register_req("alice")).unwrap();

        assert!(matches!(
            app.post(user_id, "").unwrap_err(),
            ChirpError::Validation { .. }
        ));
        assert!(matches!(
            app.post(user_id, "   ").unwrap_err(),
            ChirpError::Validation { .. }
        ));
        assert_eq!(app.storage().tweet_count().unwrap(), 0);
    }

    #[test]
    fn post_rejects_over_length_content() {
        let app = app();
        let user_id = app.register(&register_req("alice")).unwrap();

        let long = "x".repeat(MAX_TWEET_CHARS + 1);
        assert!(app.post(user_id, &long).is_err());

        let exactly = "x".repeat(MAX_TWEET_CHARS);
        assert!(app.post(user_id, &exactly).is_ok());
    }

    #[test]
    fn self_follow_always_fails() {
        let app = app();
        let user_id = app.register(&register_req("alice")).unwrap();

        assert!(matches!(
            app.follow(user_id, user_id).unwrap_err(),
            ChirpError::SelfFollow
        ));
        assert!(!app.is_following(user_id, user_id).unwrap());
    }

    #[test]
    fn follow_unfollow_idempotency() {
        let app = app();
        let alice = app.register(&register_req("alice")).unwrap();
        let bob = app.register(&register_req("bob")).unwrap();

        app.follow(alice, bob).unwrap();
        app.follow(alice, bob).unwrap();
        assert_eq!(app.storage().following_count(alice).unwrap(), 1);

        app.unfollow(alice, bob).unwrap();
        app.unfollow(alice, bob).unwrap();
        assert!(!app.is_following(alice, bob).unwrap());
    }

    #[test]
    fn alice_scenario() {
        // The end-to-end example from the requirements.
        let app = app();

        let req = RegisterRequest {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password: "pw".to_string(),
            confirm: "pw".to_string(),
        };
        app.register(&req).unwrap();

        let dup = RegisterRequest {
            email: "b@x.com".to_string(),
            ..req
        };
        assert!(matches!(
            app.register(&dup).unwrap_err(),
            ChirpError::Conflict { .. }
        ));

        assert!(matches!(
            app.login("alice", "wrong").unwrap_err(),
            ChirpError::InvalidCredentials
        ));

        let token = app.login("alice", "pw").unwrap();
        let principal = app.current_principal(&token).unwrap().unwrap();
        app.post(principal.user_id, "hi").unwrap();

        let timeline = app.timeline().unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].username, "alice");
        assert_eq!(timeline[0].content, "hi");
    }
}
