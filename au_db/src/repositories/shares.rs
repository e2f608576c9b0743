//! ABOUTME: Share event repository
//! ABOUTME: Append-only record of images shared to external platforms

use crate::db_error;
use au_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::instrument;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Share {
    pub id: String,
    pub user_id: String,
    pub image_id: String,
    pub platform: Option<String>,
    pub created_at: String,
}

pub struct ShareRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ShareRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn create(
        &self,
        user_id: &str,
        image_id: &str,
        platform: Option<&str>,
    ) -> Result<Share> {
        sqlx::query_as::<_, Share>(
            r#"
            INSERT INTO shares (id, user_id, image_id, platform, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING id, user_id, image_id, platform, created_at
            "#,
        )
        .bind(Id::new().to_string())
        .bind(user_id)
        .bind(image_id)
        .bind(platform)
        .bind(now_iso8601())
        .fetch_one(self.pool)
        .await
        .map_err(|e| db_error("Failed to record share", e))
    }

    #[instrument(skip(self))]
    pub async fn count_for_image(&self, image_id: &str) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM shares WHERE image_id = ?1")
            .bind(image_id)
            .fetch_one(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count shares: {}", e)))
    }
}
