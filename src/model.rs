//! Data models for the chirp microblog.
//!
//! These structures mirror the relational schema: users, tweets, follow
//! edges, and sessions. Tweets are immutable after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque user identifier (SQLite rowid).
pub type UserId = i64;

/// Opaque tweet identifier (SQLite rowid).
pub type TweetId = i64;

/// A registered user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Argon2 password hash. Never serialized into API output.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A tweet joined with its author's username, ready for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TweetView {
    pub id: TweetId,
    pub username: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A server-side login session
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

/// A user profile with aggregate follow counts
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub username: String,
    pub joined_at: DateTime<Utc>,
    pub tweets: Vec<TweetView>,
    pub followers_count: i64,
    pub following_count: i64,
}
