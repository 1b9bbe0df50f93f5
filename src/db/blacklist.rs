//! Refresh token blacklist.
//!
//! Only refresh tokens are ever blacklisted; access tokens are stateless and
//! expire on their own. Membership is a set keyed by JTI, so adding the same
//! JTI twice (or concurrently) is a no-op.

use sqlx::sqlite::SqlitePool;

/// Store for blacklisted refresh token identifiers.
pub struct BlacklistStore {
    pool: SqlitePool,
}

impl BlacklistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Blacklist a JTI. Returns true if it was not blacklisted before.
    pub async fn add(&self, jti: &str, user_uuid: &str, expires_at: u64) -> Result<bool, sqlx::Error> {
        let expires_at = i64::try_from(expires_at).map_err(|e| sqlx::Error::Encode(Box::new(e)))?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO blacklisted_tokens (jti, user_uuid, expires_at) VALUES (?, ?, ?)",
        )
        .bind(jti)
        .bind(user_uuid)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Whether the JTI has been blacklisted.
    pub async fn contains(&self, jti: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM blacklisted_tokens WHERE jti = ?")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Drop entries whose token has expired anyway.
    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM blacklisted_tokens WHERE expires_at <= CAST(strftime('%s', 'now') AS INTEGER)",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Number of blacklisted JTIs.
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blacklisted_tokens")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}
