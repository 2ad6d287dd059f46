//! OAuth token repository — stored Google Drive credentials.
//!
//! Token columns hold ciphertext produced by `secrets::TokenEncryptor`;
//! this module never sees plaintext.

use rusqlite::params;

use super::{Database, DatabaseError};

#[derive(Debug, Clone)]
pub struct OAuthTokenRow {
    /// Logical account key, e.g. `google_drive`.
    pub account: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl OAuthTokenRow {
    /// True if the token is expired or expires within `buffer_seconds`.
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        let Ok(expires) = chrono::DateTime::parse_from_rfc3339(&self.expires_at) else {
            return true;
        };
        let buffer = chrono::Duration::seconds(buffer_seconds.min(365 * 24 * 3600) as i64);
        expires <= chrono::Utc::now() + buffer
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// Inserts or replaces the token for an account. `created_at` is kept
/// from the first insert.
pub fn upsert(db: &Database, row: &OAuthTokenRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO oauth_tokens (account, provider, access_token, refresh_token, expires_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(account) DO UPDATE SET
               provider = ?2,
               access_token = ?3,
               refresh_token = COALESCE(?4, refresh_token),
               expires_at = ?5,
               updated_at = ?7",
            params![
                row.account,
                row.provider,
                row.access_token,
                row.refresh_token,
                row.expires_at,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

pub fn find(db: &Database, account: &str) -> Result<Option<OAuthTokenRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT account, provider, access_token, refresh_token, expires_at, created_at, updated_at
             FROM oauth_tokens WHERE account = ?1",
        )?;
        let mut rows = stmt.query_map(params![account], |row| {
            Ok(OAuthTokenRow {
                account: row.get(0)?,
                provider: row.get(1)?,
                access_token: row.get(2)?,
                refresh_token: row.get(3)?,
                expires_at: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

pub fn delete(db: &Database, account: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "DELETE FROM oauth_tokens WHERE account = ?1",
            params![account],
        )?;
        Ok(())
    })
}
