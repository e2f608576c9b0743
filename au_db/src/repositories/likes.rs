//! ABOUTME: Image like repository
//! ABOUTME: One like per (user, image) with toggle semantics

use crate::db_error;
use au_core::{time::now_iso8601, Error, Result};
use sqlx::SqlitePool;
use tracing::instrument;

pub struct LikeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LikeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Like or unlike; returns whether the image is now liked
    #[instrument(skip(self))]
    pub async fn toggle(&self, user_id: &str, image_id: &str) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ?1 AND image_id = ?2")
            .bind(user_id)
            .bind(image_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to unlike: {}", e)))?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO likes (user_id, image_id, created_at) VALUES (?1, ?2, ?3)")
                .bind(user_id)
                .bind(image_id)
                .bind(now_iso8601())
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("Failed to like", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(removed == 0)
    }

    #[instrument(skip(self))]
    pub async fn count_for_image(&self, image_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM likes WHERE image_id = ?1")
            .bind(image_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count likes: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_like_toggles() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        let image = create_image(&db, &alice.id, "a/1.png", 10).await;
        let repo = db.likes();

        assert!(repo.toggle(&bob.id, &image.image.id).await.unwrap());
        assert!(repo.toggle(&alice.id, &image.image.id).await.unwrap());
        assert_eq!(repo.count_for_image(&image.image.id).await.unwrap(), 2);

        assert!(!repo.toggle(&bob.id, &image.image.id).await.unwrap());
        assert_eq!(repo.count_for_image(&image.image.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_like_unknown_image() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        assert!(matches!(
            db.likes().toggle(&alice.id, "missing").await,
            Err(Error::NotFound(_))
        ));
    }
}
