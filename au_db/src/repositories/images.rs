//! ABOUTME: Image repository for uploaded photos and their auras
//! ABOUTME: Persists image and aura together and serves profile and feed listings

use crate::{
    db_error,
    repositories::auras::{self, Aura, NewAura},
    Page,
};
use au_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, SqlitePool};
use tracing::{debug, instrument};

/// Image entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Image {
    pub id: String,
    pub user_id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub public_id: String,
    pub provider: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub original_filename: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub user_id: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub public_id: String,
    pub provider: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub original_filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageWithAura {
    pub image: Image,
    pub aura: Option<Aura>,
}

/// Feed row: image, aura, owner display fields and like count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub image: Image,
    pub aura: Option<Aura>,
    pub owner_username: Option<String>,
    pub owner_display_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub like_count: i64,
}

const IMAGE_AURA_SELECT: &str = r#"
    SELECT i.id, i.user_id, i.url, i.thumbnail_url, i.public_id, i.provider,
           i.content_type, i.size_bytes, i.original_filename, i.created_at,
           a.id AS aura_id, a.caption AS aura_caption, a.mood AS aura_mood,
           a.color AS aura_color, a.score AS aura_score, a.tags AS aura_tags,
           a.model AS aura_model, a.created_at AS aura_created_at,
           a.updated_at AS aura_updated_at
"#;

#[derive(FromRow)]
struct ImageAuraRow {
    #[sqlx(flatten)]
    image: Image,
    aura_id: Option<String>,
    aura_caption: Option<String>,
    aura_mood: Option<String>,
    aura_color: Option<String>,
    aura_score: Option<i64>,
    aura_tags: Option<Json<Vec<String>>>,
    aura_model: Option<String>,
    aura_created_at: Option<String>,
    aura_updated_at: Option<String>,
}

impl ImageAuraRow {
    fn into_parts(self) -> ImageWithAura {
        let aura = match (self.aura_id, self.aura_created_at, self.aura_updated_at) {
            (Some(id), Some(created_at), Some(updated_at)) => Some(Aura {
                id,
                image_id: self.image.id.clone(),
                caption: self.aura_caption.unwrap_or_default(),
                mood: self.aura_mood.unwrap_or_default(),
                color: self.aura_color.unwrap_or_default(),
                score: self.aura_score.unwrap_or_default(),
                tags: self.aura_tags.unwrap_or_else(|| Json(Vec::new())),
                model: self.aura_model.unwrap_or_default(),
                created_at,
                updated_at,
            }),
            _ => None,
        };
        ImageWithAura {
            image: self.image,
            aura,
        }
    }
}

#[derive(FromRow)]
struct FeedRow {
    #[sqlx(flatten)]
    inner: ImageAuraRow,
    owner_username: Option<String>,
    owner_display_name: Option<String>,
    owner_avatar_url: Option<String>,
    like_count: i64,
}

pub struct ImageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ImageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist an image and its aura atomically
    #[instrument(skip(self, image, aura), fields(user_id = %image.user_id))]
    pub async fn create_with_aura(&self, image: NewImage, aura: NewAura) -> Result<ImageWithAura> {
        let id = Id::new().to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let stored = sqlx::query_as::<_, Image>(
            r#"
            INSERT INTO images (id, user_id, url, thumbnail_url, public_id, provider,
                                content_type, size_bytes, original_filename, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            RETURNING id, user_id, url, thumbnail_url, public_id, provider,
                      content_type, size_bytes, original_filename, created_at
            "#,
        )
        .bind(&id)
        .bind(&image.user_id)
        .bind(&image.url)
        .bind(&image.thumbnail_url)
        .bind(&image.public_id)
        .bind(&image.provider)
        .bind(&image.content_type)
        .bind(image.size_bytes)
        .bind(&image.original_filename)
        .bind(now_iso8601())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create image", e))?;

        let aura = auras::upsert(&mut *tx, &stored.id, &aura).await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!("Stored image {} with aura {}", stored.id, aura.id);
        Ok(ImageWithAura {
            image: stored,
            aura: Some(aura),
        })
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Image>> {
        sqlx::query_as::<_, Image>(
            r#"
            SELECT id, user_id, url, thumbnail_url, public_id, provider,
                   content_type, size_bytes, original_filename, created_at
            FROM images WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find image: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_with_aura(&self, id: &str) -> Result<Option<ImageWithAura>> {
        let sql = format!(
            "{} FROM images i LEFT JOIN auras a ON a.image_id = i.id WHERE i.id = ?1",
            IMAGE_AURA_SELECT
        );
        let row = sqlx::query_as::<_, ImageAuraRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find image: {}", e)))?;
        Ok(row.map(ImageAuraRow::into_parts))
    }

    /// A user's images, newest first
    #[instrument(skip(self))]
    pub async fn list_by_user(&self, user_id: &str, page: Page) -> Result<Vec<ImageWithAura>> {
        let sql = format!(
            "{} FROM images i LEFT JOIN auras a ON a.image_id = i.id \
             WHERE i.user_id = ?1 ORDER BY i.created_at DESC, i.rowid DESC LIMIT ?2 OFFSET ?3",
            IMAGE_AURA_SELECT
        );
        let rows = sqlx::query_as::<_, ImageAuraRow>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list images: {}", e)))?;
        Ok(rows.into_iter().map(ImageAuraRow::into_parts).collect())
    }

    /// Public-id list of every image a user owns, for storage cleanup
    #[instrument(skip(self))]
    pub async fn public_ids_for_user(&self, user_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT public_id FROM images WHERE user_id = ?1")
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to list image ids: {}", e)))
    }

    /// Everyone's images, newest first, with owner and like count
    #[instrument(skip(self))]
    pub async fn feed(&self, page: Page) -> Result<Vec<FeedItem>> {
        let sql = format!(
            "{}, u.username AS owner_username, u.display_name AS owner_display_name, \
                u.avatar_url AS owner_avatar_url, \
                (SELECT COUNT(*) FROM likes l WHERE l.image_id = i.id) AS like_count \
             FROM images i \
             JOIN users u ON u.id = i.user_id \
             LEFT JOIN auras a ON a.image_id = i.id \
             ORDER BY i.created_at DESC, i.rowid DESC LIMIT ?1 OFFSET ?2",
            IMAGE_AURA_SELECT
        );
        let rows = sqlx::query_as::<_, FeedRow>(&sql)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to load feed: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let parts = row.inner.into_parts();
                FeedItem {
                    image: parts.image,
                    aura: parts.aura,
                    owner_username: row.owner_username,
                    owner_display_name: row.owner_display_name,
                    owner_avatar_url: row.owner_avatar_url,
                    like_count: row.like_count,
                }
            })
            .collect())
    }

    /// Delete an image; aura, likes and shares cascade
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete image: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Image not found".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_and_find_with_aura() {
        let db = create_test_db().await;
        let user = create_user(&db, 1).await;
        let created = create_image(&db, &user.id, "u/1.png", 64).await;

        let found = db
            .images()
            .find_with_aura(&created.image.id)
            .await
            .unwrap()
            .expect("image exists");
        assert_eq!(found.image.public_id, "u/1.png");
        let aura = found.aura.expect("aura joined");
        assert_eq!(aura.score, 64);
        assert_eq!(aura.tags.0, vec!["sunset"]);
        assert_eq!(aura.image_id, created.image.id);
    }

    #[tokio::test]
    async fn test_failed_aura_rolls_back_image() {
        let db = create_test_db().await;
        let user = create_user(&db, 1).await;

        // score outside 0..=100 violates the CHECK constraint
        let result = db
            .images()
            .create_with_aura(new_image(&user.id, "u/bad.png"), new_aura(500))
            .await;
        assert!(result.is_err());

        let images = db.images().list_by_user(&user.id, Page::default()).await.unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_list_by_user_and_feed_order() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;

        let first = create_image(&db, &alice.id, "a/1.png", 10).await;
        let second = create_image(&db, &bob.id, "b/1.png", 20).await;
        let third = create_image(&db, &alice.id, "a/2.png", 30).await;
        db.likes().toggle(&bob.id, &third.image.id).await.unwrap();

        let mine = db.images().list_by_user(&alice.id, Page::default()).await.unwrap();
        let ids: Vec<_> = mine.iter().map(|i| i.image.id.clone()).collect();
        assert_eq!(ids, vec![third.image.id.clone(), first.image.id.clone()]);

        let feed = db.images().feed(Page::default()).await.unwrap();
        let ids: Vec<_> = feed.iter().map(|i| i.image.id.clone()).collect();
        assert_eq!(
            ids,
            vec![third.image.id.clone(), second.image.id, first.image.id]
        );
        assert_eq!(feed[0].like_count, 1);
        assert_eq!(feed[1].like_count, 0);

        let paged = db.images().feed(Page::new(Some(1), Some(1))).await.unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].owner_username, None);
    }

    #[tokio::test]
    async fn test_delete_image() {
        let db = create_test_db().await;
        let user = create_user(&db, 1).await;
        let created = create_image(&db, &user.id, "u/1.png", 10).await;

        assert_eq!(
            db.images().public_ids_for_user(&user.id).await.unwrap(),
            vec!["u/1.png".to_string()]
        );

        db.images().delete(&created.image.id).await.unwrap();
        assert!(db.auras().find_by_image(&created.image.id).await.unwrap().is_none());
        assert!(matches!(
            db.images().delete(&created.image.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
