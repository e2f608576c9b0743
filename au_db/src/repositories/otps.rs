//! ABOUTME: One-time passcode storage keyed by phone number
//! ABOUTME: Keeps a single pending code per phone and purges expired rows

use au_core::{Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Pending passcode; `expires_at` and `created_at` are unix seconds
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Otp {
    pub id: String,
    pub phone_number: String,
    pub code_hash: String,
    pub attempts: i64,
    pub expires_at: i64,
    pub created_at: i64,
}

impl Otp {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct NewOtp {
    pub phone_number: String,
    pub code_hash: String,
    pub expires_at: i64,
    pub created_at: i64,
}

pub struct OtpRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OtpRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Drop any pending code for the phone and store the new one
    #[instrument(skip(self, otp), fields(phone = %otp.phone_number))]
    pub async fn replace_for_phone(&self, otp: NewOtp) -> Result<Otp> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("DELETE FROM otps WHERE phone_number = ?1")
            .bind(&otp.phone_number)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to clear pending otps: {}", e)))?;

        let stored = sqlx::query_as::<_, Otp>(
            r#"
            INSERT INTO otps (id, phone_number, code_hash, attempts, expires_at, created_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5)
            RETURNING id, phone_number, code_hash, attempts, expires_at, created_at
            "#,
        )
        .bind(Id::new().to_string())
        .bind(&otp.phone_number)
        .bind(&otp.code_hash)
        .bind(otp.expires_at)
        .bind(otp.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| Error::Database(format!("Failed to store otp: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn latest_for_phone(&self, phone_number: &str) -> Result<Option<Otp>> {
        sqlx::query_as::<_, Otp>(
            r#"
            SELECT id, phone_number, code_hash, attempts, expires_at, created_at
            FROM otps WHERE phone_number = ?1
            ORDER BY created_at DESC, id DESC LIMIT 1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load otp: {}", e)))
    }

    /// Record a failed attempt and return the new count
    #[instrument(skip(self))]
    pub async fn increment_attempts(&self, id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE otps SET attempts = attempts + 1 WHERE id = ?1 RETURNING attempts",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to increment otp attempts: {}", e)))?
        .ok_or_else(|| Error::NotFound("OTP not found".to_string()))
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM otps WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete otp: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_for_phone(&self, phone_number: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE phone_number = ?1")
            .bind(phone_number)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete otps: {}", e)))?;
        Ok(result.rows_affected())
    }

    /// Remove every code whose window has closed
    #[instrument(skip(self))]
    pub async fn delete_expired(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM otps WHERE expires_at <= ?1")
            .bind(now)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete expired otps: {}", e)))?;

        debug!("Deleted {} expired otps", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_db;
    use test_support::test_phone;

    fn new_otp(phone: &str, created_at: i64, ttl: i64) -> NewOtp {
        NewOtp {
            phone_number: phone.to_string(),
            code_hash: "hash".to_string(),
            expires_at: created_at + ttl,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_replace_keeps_one_pending_code() {
        let db = create_test_db().await;
        let repo = db.otps();
        let phone = test_phone(1);

        let first = repo.replace_for_phone(new_otp(&phone, 1_000, 300)).await.unwrap();
        let second = repo.replace_for_phone(new_otp(&phone, 1_100, 300)).await.unwrap();
        assert_ne!(first.id, second.id);

        let latest = repo.latest_for_phone(&phone).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.attempts, 0);

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM otps")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn test_increment_attempts() {
        let db = create_test_db().await;
        let repo = db.otps();
        let otp = repo
            .replace_for_phone(new_otp(&test_phone(1), 1_000, 300))
            .await
            .unwrap();

        assert_eq!(repo.increment_attempts(&otp.id).await.unwrap(), 1);
        assert_eq!(repo.increment_attempts(&otp.id).await.unwrap(), 2);

        repo.delete(&otp.id).await.unwrap();
        assert!(matches!(
            repo.increment_attempts(&otp.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expiry_window_and_cleanup() {
        let db = create_test_db().await;
        let repo = db.otps();

        let stale = repo
            .replace_for_phone(new_otp(&test_phone(1), 1_000, 300))
            .await
            .unwrap();
        repo.replace_for_phone(new_otp(&test_phone(2), 1_200, 300))
            .await
            .unwrap();

        assert!(!stale.is_expired(1_299));
        assert!(stale.is_expired(1_300));

        assert_eq!(repo.delete_expired(1_300).await.unwrap(), 1);
        assert!(repo.latest_for_phone(&test_phone(1)).await.unwrap().is_none());
        assert!(repo.latest_for_phone(&test_phone(2)).await.unwrap().is_some());
        assert_eq!(repo.delete_for_phone(&test_phone(2)).await.unwrap(), 1);
    }
}
