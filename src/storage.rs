//! `SQLite` storage for the chirp microblog.
//!
//! Plain data-access layer (repository pattern) over the entity tables.
//! Uniqueness of usernames, emails, and follow edges is enforced by the
//! schema; constraint violations are mapped to domain errors so callers
//! never see a raw `SQLite` fault for a user mistake.

use crate::error::{ChirpError, Result};
use crate::model::{ProfileView, Session, TweetId, TweetView, User, UserId};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

const SCHEMA_VERSION: i32 = 1;

fn parse_rfc3339_or_epoch(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value).map_or_else(
        |_| DateTime::<Utc>::from_timestamp(0, 0).unwrap_or_default(),
        |dt| dt.with_timezone(&Utc),
    )
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;

        // Set pragmas for performance and integrity
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            ",
        )?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Get a reference to the underlying database connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let current_version = self.get_schema_version();

        if current_version > SCHEMA_VERSION {
            return Err(ChirpError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }

        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.create_schema()?;
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: std::result::Result<i32, _> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat missing schema table as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            -- Metadata table
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- User accounts
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Tweets. Ownership is exclusive and lifetime-bound:
            -- deleting a user deletes their tweets.
            CREATE TABLE IF NOT EXISTS tweets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tweets_created_at ON tweets(created_at);
            CREATE INDEX IF NOT EXISTS idx_tweets_user ON tweets(user_id);

            -- Follow edges. The composite key makes duplicate edges
            -- impossible even when two requests race.
            CREATE TABLE IF NOT EXISTS follows (
                follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                followed_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (follower_id, followed_id)
            );
            CREATE INDEX IF NOT EXISTS idx_follows_followed ON follows(followed_id);

            -- Login sessions
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            ",
        )?;

        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Insert a new user.
    ///
    /// The UNIQUE constraints on username and email are authoritative:
    /// a violation maps to [`ChirpError::Conflict`], so two concurrent
    /// registrations cannot both win.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the username or email is taken.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> Result<UserId> {
        let result = self.conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
            params![username, email, password_hash, Utc::now().to_rfc3339()],
        );

        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => {
                let message = e.to_string();
                if message.contains("users.email") {
                    Err(ChirpError::conflict("Email", email))
                } else {
                    Err(ChirpError::conflict("Username", username))
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn user_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at
                 FROM users WHERE username = ?",
                params![username],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at
                 FROM users WHERE email = ?",
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn user_by_id(&self, id: UserId) -> Result<Option<User>> {
        let user = self
            .conn
            .query_row(
                "SELECT id, username, email, password_hash, created_at
                 FROM users WHERE id = ?",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Delete a user. Tweets, follow edges, and sessions cascade.
    ///
    /// # Errors
    ///
    /// Returns an error if the database delete fails.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM users WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    // =========================================================================
    // Tweets
    // =========================================================================

    /// Insert a tweet owned by the given user, timestamped now.
    ///
    /// Content validation (non-empty, bounded) is the service layer's
    /// job; the storage layer only enforces the NOT NULL author.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_tweet(&self, user_id: UserId, content: &str) -> Result<TweetId> {
        self.conn.execute(
            "INSERT INTO tweets (user_id, content, created_at) VALUES (?, ?, ?)",
            params![user_id, content, Utc::now().to_rfc3339()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Global timeline: all tweets, newest first. Ties on the creation
    /// timestamp break by id descending (insertion order), so ordering
    /// is consistent across calls.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn timeline(&self, limit: usize) -> Result<Vec<TweetView>> {
        self.query_timeline(
            "SELECT t.id, u.username, t.content, t.created_at
             FROM tweets t JOIN users u ON u.id = t.user_id
             ORDER BY t.created_at DESC, t.id DESC
             LIMIT ?",
            params![limit as i64],
        )
    }

    /// Tweets authored by one user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tweets_by_user(&self, user_id: UserId, limit: usize) -> Result<Vec<TweetView>> {
        self.query_timeline(
            "SELECT t.id, u.username, t.content, t.created_at
             FROM tweets t JOIN users u ON u.id = t.user_id
             WHERE t.user_id = ?
             ORDER BY t.created_at DESC, t.id DESC
             LIMIT ?",
            params![user_id, limit as i64],
        )
    }

    /// Personalized timeline: the union of the user's own tweets and
    /// tweets from everyone they follow. Each tweet appears once.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn followed_timeline(&self, user_id: UserId, limit: usize) -> Result<Vec<TweetView>> {
        self.query_timeline(
            "SELECT t.id, u.username, t.content, t.created_at
             FROM tweets t JOIN users u ON u.id = t.user_id
             WHERE t.user_id = ?1
                OR t.user_id IN (SELECT followed_id FROM follows WHERE follower_id = ?1)
             ORDER BY t.created_at DESC, t.id DESC
             LIMIT ?2",
            params![user_id, limit as i64],
        )
    }

    fn query_timeline(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<TweetView>> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(args, |row| {
            let created_at: String = row.get(3)?;
            Ok(TweetView {
                id: row.get(0)?,
                username: row.get(1)?,
                content: row.get(2)?,
                created_at: parse_rfc3339_or_epoch(&created_at),
            })
        })?;

        let mut tweets = Vec::new();
        for row in rows {
            tweets.push(row?);
        }
        Ok(tweets)
    }

    /// Total number of tweet rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn tweet_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM tweets", [], |row| row.get(0))?;
        Ok(count)
    }

    // =========================================================================
    // Follow graph
    // =========================================================================

    /// Add a follow edge. Idempotent: inserting an existing edge is a
    /// no-op. Returns whether a new edge was created.
    ///
    /// Self-follow rejection lives in the service layer; the storage
    /// layer stores whatever edge it is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_follow(&self, follower_id: UserId, followed_id: UserId) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO follows (follower_id, followed_id, created_at)
             VALUES (?, ?, ?)",
            params![follower_id, followed_id, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    /// Remove a follow edge. Idempotent: removing a missing edge is a
    /// no-op, not an error. Returns whether an edge was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_follow(&self, follower_id: UserId, followed_id: UserId) -> Result<bool> {
        let changed = self.conn.execute(
            "DELETE FROM follows WHERE follower_id = ? AND followed_id = ?",
            params![follower_id, followed_id],
        )?;
        Ok(changed > 0)
    }

    /// Membership test on the edge set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn is_following(&self, follower_id: UserId, followed_id: UserId) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ? AND followed_id = ?",
            params![follower_id, followed_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Number of users following the given user.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn followers_count(&self, user_id: UserId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE followed_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of users the given user follows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn following_count(&self, user_id: UserId) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Store a new session.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_session(&self, token: &str, user_id: UserId, ttl: Duration) -> Result<()> {
        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            params![
                token,
                user_id,
                now.to_rfc3339(),
                (now + ttl).to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Look up a session by token. Expired sessions are deleted on
    /// sight and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn session_by_token(&self, token: &str) -> Result<Option<Session>> {
        let session = self
            .conn
            .query_row(
                "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?",
                params![token],
                |row| {
                    let created_at: String = row.get(2)?;
                    let expires_at: String = row.get(3)?;
                    Ok(Session {
                        token: row.get(0)?,
                        user_id: row.get(1)?,
                        created_at: parse_rfc3339_or_epoch(&created_at),
                        expires_at: parse_rfc3339_or_epoch(&expires_at),
                    })
                },
            )
            .optional()?;

        match session {
            Some(s) if s.is_valid() => Ok(Some(s)),
            Some(s) => {
                self.delete_session(&s.token)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Remove a session. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sessions WHERE token = ?", params![token])?;
        Ok(())
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Assemble a profile view for a username.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown username.
    pub fn profile(&self, username: &str, tweet_limit: usize) -> Result<ProfileView> {
        let user = self
            .user_by_username(username)?
            .ok_or_else(|| ChirpError::not_found("User", username))?;

        Ok(ProfileView {
            username: user.username.clone(),
            joined_at: user.created_at,
            tweets: self.tweets_by_user(user.id, tweet_limit)?,
            followers_count: self.followers_count(user.id)?,
            following_count: self.following_count(user.id)?,
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> std::result::Result<User, rusqlite::Error> {
    let created_at: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_rfc3339_or_epoch(&created_at),
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
