//! ABOUTME: Follow graph repository
//! ABOUTME: Toggle semantics over a unique (follower, following) pair

use crate::{db_error, Page};
use au_core::{time::now_iso8601, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

/// User summary in follower/following lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowUser {
    pub id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub followed_at: String,
}

pub struct FollowRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> FollowRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Follow if not following, otherwise unfollow; returns the new state
    #[instrument(skip(self))]
    pub async fn toggle(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        if follower_id == following_id {
            return Err(Error::Validation("Users cannot follow themselves".to_string()));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2")
            .bind(follower_id)
            .bind(following_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to unfollow: {}", e)))?
            .rows_affected();

        if removed == 0 {
            sqlx::query(
                "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, ?3)",
            )
            .bind(follower_id)
            .bind(following_id)
            .bind(now_iso8601())
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to follow", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        let following = removed == 0;
        debug!(following, "Toggled follow");
        Ok(following)
    }

    #[instrument(skip(self))]
    pub async fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_one(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check follow: {}", e)))?;
        Ok(exists > 0)
    }

    /// Users following `user_id`, most recent first
    #[instrument(skip(self))]
    pub async fn followers(&self, user_id: &str, page: Page) -> Result<Vec<FollowUser>> {
        sqlx::query_as::<_, FollowUser>(
            r#"
            SELECT u.id, u.username, u.display_name, u.avatar_url, f.created_at AS followed_at
            FROM follows f JOIN users u ON u.id = f.follower_id
            WHERE f.following_id = ?1
            ORDER BY f.created_at DESC, f.rowid DESC LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list followers: {}", e)))
    }

    /// Users `user_id` follows, most recent first
    #[instrument(skip(self))]
    pub async fn following(&self, user_id: &str, page: Page) -> Result<Vec<FollowUser>> {
        sqlx::query_as::<_, FollowUser>(
            r#"
            SELECT u.id, u.username, u.display_name, u.avatar_url, f.created_at AS followed_at
            FROM follows f JOIN users u ON u.id = f.following_id
            WHERE f.follower_id = ?1
            ORDER BY f.created_at DESC, f.rowid DESC LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list following: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn follower_count(&self, user_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM follows WHERE following_id = ?1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count followers: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_follow_toggles() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        let repo = db.follows();

        assert!(repo.toggle(&bob.id, &alice.id).await.unwrap());
        assert!(repo.is_following(&bob.id, &alice.id).await.unwrap());
        assert!(!repo.is_following(&alice.id, &bob.id).await.unwrap());
        assert_eq!(repo.follower_count(&alice.id).await.unwrap(), 1);

        assert!(!repo.toggle(&bob.id, &alice.id).await.unwrap());
        assert!(!repo.is_following(&bob.id, &alice.id).await.unwrap());
        assert_eq!(repo.follower_count(&alice.id).await.unwrap(), 0);

        assert!(repo.toggle(&bob.id, &alice.id).await.unwrap());
        assert_eq!(repo.follower_count(&alice.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_follow_pair_is_unique() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        db.follows().toggle(&bob.id, &alice.id).await.unwrap();

        let err = sqlx::query(
            "INSERT INTO follows (follower_id, following_id, created_at) VALUES (?1, ?2, 'now')",
        )
        .bind(&bob.id)
        .bind(&alice.id)
        .execute(db.pool())
        .await
        .unwrap_err();
        assert!(err
            .as_database_error()
            .map(|e| e.is_unique_violation())
            .unwrap_or(false));
    }

    #[tokio::test]
    async fn test_self_follow_and_unknown_user() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;

        assert!(matches!(
            db.follows().toggle(&alice.id, &alice.id).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            db.follows().toggle(&alice.id, "ghost").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_follower_and_following_lists() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        let carol = create_user(&db, 3).await;

        db.follows().toggle(&bob.id, &alice.id).await.unwrap();
        db.follows().toggle(&carol.id, &alice.id).await.unwrap();
        db.follows().toggle(&alice.id, &carol.id).await.unwrap();

        let followers = db.follows().followers(&alice.id, Page::default()).await.unwrap();
        let ids: Vec<_> = followers.iter().map(|f| f.id.clone()).collect();
        assert_eq!(ids, vec![carol.id.clone(), bob.id.clone()]);

        let following = db.follows().following(&alice.id, Page::default()).await.unwrap();
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].id, carol.id);
    }
}
