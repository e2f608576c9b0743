//! ABOUTME: Leaderboard storage and recomputation
//! ABOUTME: Aggregates scores per user and replaces stored standings atomically

use crate::{leaderboard::rank_standings, Page, Standing};
use au_core::{time::now_iso8601, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{info, instrument};

/// Stored leaderboard row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub rank: i64,
    pub total_score: i64,
    pub image_count: i64,
    pub like_count: i64,
    pub computed_at: String,
}

/// Leaderboard row joined with user display fields
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LeaderboardRow {
    #[sqlx(flatten)]
    pub entry: LeaderboardEntry,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct LeaderboardRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LeaderboardRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Per-user aggregates for every user with at least one image
    #[instrument(skip(self))]
    pub async fn fetch_standings(&self) -> Result<Vec<Standing>> {
        sqlx::query_as::<_, Standing>(
            r#"
            SELECT u.id AS user_id,
                   u.created_at AS user_created_at,
                   COALESCE(SUM(a.score), 0) AS total_score,
                   COUNT(i.id) AS image_count,
                   (SELECT COUNT(*) FROM likes l
                      JOIN images li ON li.id = l.image_id
                     WHERE li.user_id = u.id) AS like_count
            FROM users u
            JOIN images i ON i.user_id = u.id
            LEFT JOIN auras a ON a.image_id = i.id
            GROUP BY u.id, u.created_at
            "#,
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to fetch standings: {}", e)))
    }

    /// Swap the stored standings for `ranked` in one transaction
    #[instrument(skip(self, ranked), fields(count = ranked.len()))]
    pub async fn replace(&self, ranked: &[(i64, Standing)]) -> Result<()> {
        let now = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        sqlx::query("DELETE FROM leaderboard_entries")
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to clear leaderboard: {}", e)))?;

        for (rank, standing) in ranked {
            sqlx::query(
                r#"
                INSERT INTO leaderboard_entries
                    (user_id, rank, total_score, image_count, like_count, computed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )
            .bind(&standing.user_id)
            .bind(*rank)
            .bind(standing.total_score)
            .bind(standing.image_count)
            .bind(standing.like_count)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to store leaderboard entry: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    /// Fetch, rank and store; returns the number of ranked users
    #[instrument(skip(self))]
    pub async fn recompute(&self) -> Result<usize> {
        let standings = self.fetch_standings().await?;
        let ranked = rank_standings(standings);
        self.replace(&ranked).await?;

        info!("Leaderboard recomputed with {} entries", ranked.len());
        Ok(ranked.len())
    }

    #[instrument(skip(self))]
    pub async fn list(&self, page: Page) -> Result<Vec<LeaderboardRow>> {
        sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT e.user_id, e.rank, e.total_score, e.image_count, e.like_count, e.computed_at,
                   u.username, u.display_name, u.avatar_url
            FROM leaderboard_entries e JOIN users u ON u.id = e.user_id
            ORDER BY e.rank ASC LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list leaderboard: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM leaderboard_entries")
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count leaderboard: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn entry_for_user(&self, user_id: &str) -> Result<Option<LeaderboardEntry>> {
        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT user_id, rank, total_score, image_count, like_count, computed_at
            FROM leaderboard_entries WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to load leaderboard entry: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::*;
    use crate::Page;

    #[tokio::test]
    async fn test_recompute_ranks_users_with_images() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        let carol = create_user(&db, 3).await;
        let _lurker = create_user(&db, 4).await;

        create_image(&db, &alice.id, "a/1.png", 40).await;
        create_image(&db, &alice.id, "a/2.png", 30).await;
        let bob_image = create_image(&db, &bob.id, "b/1.png", 70).await;
        create_image(&db, &carol.id, "c/1.png", 90).await;
        db.likes().toggle(&alice.id, &bob_image.image.id).await.unwrap();

        assert_eq!(db.leaderboard().count().await.unwrap(), 0);
        assert_eq!(db.leaderboard().recompute().await.unwrap(), 3);

        let rows = db.leaderboard().list(Page::default()).await.unwrap();
        let order: Vec<_> = rows.iter().map(|r| r.entry.user_id.clone()).collect();
        // alice and bob tie on 70; bob has a like
        assert_eq!(order, vec![carol.id.clone(), bob.id.clone(), alice.id.clone()]);
        assert_eq!(rows[1].entry.like_count, 1);
        assert_eq!(rows[2].entry.image_count, 2);

        let entry = db.leaderboard().entry_for_user(&alice.id).await.unwrap().unwrap();
        assert_eq!(entry.rank, 3);
        assert_eq!(entry.total_score, 70);
    }

    #[tokio::test]
    async fn test_recompute_replaces_previous_standings() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let image = create_image(&db, &alice.id, "a/1.png", 40).await;

        db.leaderboard().recompute().await.unwrap();
        assert_eq!(db.leaderboard().count().await.unwrap(), 1);

        db.images().delete(&image.image.id).await.unwrap();
        assert_eq!(db.leaderboard().recompute().await.unwrap(), 0);
        assert_eq!(db.leaderboard().count().await.unwrap(), 0);
    }
}
