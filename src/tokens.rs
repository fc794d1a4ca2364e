//! Durable token records and expiry-based refresh.
//!
//! One SQLite row per user identity holds the OAuth credential bundle. The
//! [`CredentialManager`] checks expiry against an injected clock and performs
//! at most one refresh call per action.

use crate::auth::{AuthError, TokenRefresher};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Tokens expiring within this many minutes are renewed early.
const REFRESH_BUFFER_MINUTES: i64 = 5;

/// Fallback lifetime in minutes when the provider does not report one.
const DEFAULT_LIFETIME_MINUTES: i64 = 60;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("token store error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("invalid timestamp in token store: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Stored OAuth credential bundle for one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Instant after which the access token is invalid.
    pub expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// SQLite-backed store with at most one record per user identity.
pub struct TokenStore {
    conn: Mutex<Connection>,
}

impl TokenStore {
    /// Creates or opens the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<TokenStore, StoreError> {
        TokenStore::init(Connection::open(path)?)
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> Result<TokenStore, StoreError> {
        TokenStore::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<TokenStore, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS google_tokens (
                user_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expiry TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(TokenStore {
            conn: Mutex::new(conn),
        })
    }

    /// Fetches the record for `user_id`, if any.
    pub fn get(&self, user_id: &str) -> Result<Option<TokenRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();

        let row = conn
            .query_row(
                "SELECT user_id, access_token, refresh_token, expiry, created_at, updated_at
                 FROM google_tokens WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, access_token, refresh_token, expiry, created_at, updated_at)) = row
        else {
            return Ok(None);
        };

        Ok(Some(TokenRecord {
            user_id,
            access_token,
            refresh_token,
            expiry: parse_timestamp(&expiry)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    /// Inserts or replaces the record for `user_id`, keeping `created_at` of
    /// an existing row.
    pub fn upsert(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();

        conn.execute(
            r#"
            INSERT INTO google_tokens (user_id, access_token, refresh_token, expiry, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            ON CONFLICT(user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expiry = excluded.expiry,
                updated_at = excluded.updated_at
            "#,
            params![user_id, access_token, refresh_token, expiry.to_rfc3339(), now],
        )?;

        Ok(())
    }
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, StoreError> {
    Ok(DateTime::parse_from_rfc3339(text)?.with_timezone(&Utc))
}

/// A source of "now". Injected so expiry comparisons are deterministic in
/// tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The ambient system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Keeps stored credential bundles fresh.
pub struct CredentialManager {
    store: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
    ) -> CredentialManager {
        CredentialManager {
            store,
            refresher,
            clock,
        }
    }

    /// Refreshes the stored bundle for `user_id` when it has less than five
    /// minutes of lifetime left.
    ///
    /// Returns `false` without touching anything when no bundle exists or it
    /// is still fresh, so redundant calls are harmless. A refresh overwrites
    /// the access token, keeps the stored refresh token unless the provider
    /// returned a new one, and sets the new expiry (provider-reported, or one
    /// hour out).
    pub async fn ensure_fresh(&self, user_id: &str) -> crate::Result<bool> {
        let Some(record) = self.store.get(user_id)? else {
            return Ok(false);
        };

        if record.expiry > self.clock.now() + Duration::minutes(REFRESH_BUFFER_MINUTES) {
            return Ok(false);
        }

        let refresh_token = record
            .refresh_token
            .clone()
            .ok_or(AuthError::NoRefreshToken)?;

        log::info!("access token for {user_id} is stale, refreshing");

        let response = self.refresher.refresh_access_token(&refresh_token).await?;

        let expiry = match response.expires_in {
            Some(seconds) => self.clock.now() + Duration::seconds(seconds),
            None => self.clock.now() + Duration::minutes(DEFAULT_LIFETIME_MINUTES),
        };
        let refresh_token = response.refresh_token.or(record.refresh_token);

        self.store.upsert(
            user_id,
            &response.access_token,
            refresh_token.as_deref(),
            expiry,
        )?;

        Ok(true)
    }
}
