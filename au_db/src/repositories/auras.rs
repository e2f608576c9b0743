//! ABOUTME: Aura repository holding the generated caption metadata per image
//! ABOUTME: One aura per image, enforced by a unique image_id and upserts

use au_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, SqliteExecutor, SqlitePool};
use tracing::instrument;

/// Aura entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Aura {
    pub id: String,
    pub image_id: String,
    pub caption: String,
    pub mood: String,
    pub color: String,
    pub score: i64,
    pub tags: Json<Vec<String>>,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Generated analysis ready to persist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAura {
    pub caption: String,
    pub mood: String,
    pub color: String,
    pub score: i64,
    pub tags: Vec<String>,
    pub model: String,
}

/// Insert or replace the aura of an image on any executor (pool or transaction)
pub(crate) async fn upsert<'e, E>(executor: E, image_id: &str, aura: &NewAura) -> Result<Aura>
where
    E: SqliteExecutor<'e>,
{
    let now = now_iso8601();
    sqlx::query_as::<_, Aura>(
        r#"
        INSERT INTO auras (id, image_id, caption, mood, color, score, tags, model, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        ON CONFLICT(image_id) DO UPDATE SET
            caption = excluded.caption,
            mood = excluded.mood,
            color = excluded.color,
            score = excluded.score,
            tags = excluded.tags,
            model = excluded.model,
            updated_at = excluded.updated_at
        RETURNING id, image_id, caption, mood, color, score, tags, model, created_at, updated_at
        "#,
    )
    .bind(Id::new().to_string())
    .bind(image_id)
    .bind(&aura.caption)
    .bind(&aura.mood)
    .bind(&aura.color)
    .bind(aura.score)
    .bind(Json(&aura.tags))
    .bind(&aura.model)
    .bind(&now)
    .fetch_one(executor)
    .await
    .map_err(|e| crate::db_error("Failed to save aura", e))
}

pub struct AuraRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuraRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn find_by_image(&self, image_id: &str) -> Result<Option<Aura>> {
        sqlx::query_as::<_, Aura>(
            r#"
            SELECT id, image_id, caption, mood, color, score, tags, model, created_at, updated_at
            FROM auras WHERE image_id = ?1
            "#,
        )
        .bind(image_id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find aura: {}", e)))
    }

    /// Replace the aura of an existing image, keeping its id and created_at
    #[instrument(skip(self, aura))]
    pub async fn upsert_for_image(&self, image_id: &str, aura: NewAura) -> Result<Aura> {
        upsert(self.pool, image_id, &aura).await
    }
}
