//! ABOUTME: User repository for phone-based accounts and profiles
//! ABOUTME: Handles creation on first login, profile edits, search and deletion

use crate::db_error;
use au_core::{time::now_iso8601, Error, Id, Result};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, instrument};

const USER_COLUMNS: &str = "id, phone_number, username, display_name, bio, avatar_url, is_verified, created_at, updated_at";

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub phone_number: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial profile update; `None` leaves the column untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProfile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

impl UpdateProfile {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.display_name.is_none()
            && self.bio.is_none()
            && self.avatar_url.is_none()
    }
}

/// Counters shown on a public profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    pub follower_count: i64,
    pub following_count: i64,
    pub image_count: i64,
    pub total_aura_score: i64,
}

/// User repository
pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an unverified user for a phone number
    #[instrument(skip(self, phone_number))]
    pub async fn create(&self, phone_number: &str) -> Result<User> {
        let id = Id::new().to_string();
        let now = now_iso8601();

        debug!("Creating user with id: {}", id);

        let sql = format!(
            "INSERT INTO users (id, phone_number, is_verified, created_at, updated_at) \
             VALUES (?1, ?2, FALSE, ?3, ?3) RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&id)
            .bind(phone_number)
            .bind(&now)
            .fetch_one(self.pool)
            .await
            .map_err(|e| db_error("Failed to create user", e))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find user by id: {}", e)))
    }

    #[instrument(skip(self, phone_number))]
    pub async fn find_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE phone_number = ?1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(phone_number)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find user by phone: {}", e)))
    }

    #[instrument(skip(self))]
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&sql)
            .bind(username)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to find user by username: {}", e)))
    }

    /// Look up the account for a verified phone, creating it on first login
    ///
    /// Returns the user and whether it was created by this call.
    #[instrument(skip(self, phone_number))]
    pub async fn find_or_create_verified(&self, phone_number: &str) -> Result<(User, bool)> {
        let now = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let inserted = sqlx::query(
            "INSERT INTO users (id, phone_number, is_verified, created_at, updated_at) \
             VALUES (?1, ?2, TRUE, ?3, ?3) ON CONFLICT(phone_number) DO NOTHING",
        )
        .bind(Id::new().to_string())
        .bind(phone_number)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create user", e))?
        .rows_affected()
            == 1;

        let sql = format!(
            "UPDATE users SET is_verified = TRUE, updated_at = CASE WHEN is_verified THEN updated_at ELSE ?2 END \
             WHERE phone_number = ?1 RETURNING {}",
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(phone_number)
            .bind(&now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| Error::Database(format!("Failed to mark user verified: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        debug!(user_id = %user.id, created = inserted, "Resolved user for verified phone");
        Ok((user, inserted))
    }

    /// Apply a partial profile update; a taken username is a conflict
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, id: &str, update: UpdateProfile) -> Result<User> {
        if update.is_empty() {
            return Err(Error::Validation("No fields to update".to_string()));
        }

        let sql = format!(
            "UPDATE users SET \
               username = COALESCE(?1, username), \
               display_name = COALESCE(?2, display_name), \
               bio = COALESCE(?3, bio), \
               avatar_url = COALESCE(?4, avatar_url), \
               updated_at = ?5 \
             WHERE id = ?6 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(update.username)
            .bind(update.display_name)
            .bind(update.bio)
            .bind(update.avatar_url)
            .bind(now_iso8601())
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| db_error("Failed to update profile", e))?
            .ok_or_else(|| Error::NotFound("User not found".to_string()))
    }

    /// Hard delete; images, auras, follows, likes and shares cascade
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete user: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("User not found".to_string()));
        }

        debug!("Deleted user: {}", id);
        Ok(())
    }

    /// Case-insensitive prefix search over username and display name
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<User>> {
        let pattern = format!("{}%", escape_like(query));
        let sql = format!(
            "SELECT {} FROM users \
             WHERE username LIKE ?1 ESCAPE '\\' OR display_name LIKE ?1 ESCAPE '\\' \
             ORDER BY username IS NULL, username, created_at LIMIT ?2",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(pattern)
            .bind(limit)
            .fetch_all(self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search users: {}", e)))
    }

    /// Profile counters, queried concurrently
    #[instrument(skip(self))]
    pub async fn profile_stats(&self, id: &str) -> Result<ProfileStats> {
        let count = |sql: &'static str| async move {
            sqlx::query_scalar::<_, i64>(sql)
                .bind(id)
                .fetch_one(self.pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to load profile stats: {}", e)))
        };

        let (follower_count, following_count, image_count, total_aura_score) = tokio::try_join!(
            count("SELECT COUNT(*) FROM follows WHERE following_id = ?1"),
            count("SELECT COUNT(*) FROM follows WHERE follower_id = ?1"),
            count("SELECT COUNT(*) FROM images WHERE user_id = ?1"),
            count(
                "SELECT COALESCE(SUM(a.score), 0) FROM auras a \
                 JOIN images i ON i.id = a.image_id WHERE i.user_id = ?1"
            ),
        )?;

        Ok(ProfileStats {
            follower_count,
            following_count,
            image_count,
            total_aura_score,
        })
    }
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use test_support::test_phone;

    #[tokio::test]
    async fn test_phone_number_is_unique() {
        let db = create_test_db().await;
        let repo = db.users();

        repo.create(&test_phone(7)).await.unwrap();
        let err = repo.create(&test_phone(7)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_find_or_create_verified() {
        let db = create_test_db().await;
        let repo = db.users();

        let (user, created) = repo.find_or_create_verified(&test_phone(1)).await.unwrap();
        assert!(created);
        assert!(user.is_verified);

        let (again, created) = repo.find_or_create_verified(&test_phone(1)).await.unwrap();
        assert!(!created);
        assert_eq!(again.id, user.id);

        // pre-existing unverified account gets verified
        let pending = repo.create(&test_phone(2)).await.unwrap();
        assert!(!pending.is_verified);
        let (verified, created) = repo.find_or_create_verified(&test_phone(2)).await.unwrap();
        assert!(!created);
        assert_eq!(verified.id, pending.id);
        assert!(verified.is_verified);
    }

    #[tokio::test]
    async fn test_update_profile_and_username_conflict() {
        let db = create_test_db().await;
        let repo = db.users();
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;

        let updated = repo
            .update_profile(
                &alice.id,
                UpdateProfile {
                    username: Some("alice".to_string()),
                    bio: Some("hi".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username.as_deref(), Some("alice"));
        assert_eq!(updated.bio.as_deref(), Some("hi"));
        assert!(updated.display_name.is_none());

        let err = repo
            .update_profile(
                &bob.id,
                UpdateProfile {
                    username: Some("alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        let err = repo
            .update_profile(&bob.id, UpdateProfile::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = repo
            .update_profile(
                "nope",
                UpdateProfile {
                    bio: Some("x".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_by_prefix() {
        let db = create_test_db().await;
        let repo = db.users();
        for (n, name) in [(1, "sunny"), (2, "sunset_lover"), (3, "moon")] {
            let user = create_user(&db, n).await;
            repo.update_profile(
                &user.id,
                UpdateProfile {
                    username: Some(name.to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        }

        let found = repo.search("sun", 20).await.unwrap();
        let names: Vec<_> = found.iter().filter_map(|u| u.username.clone()).collect();
        assert_eq!(names, vec!["sunny", "sunset_lover"]);

        // LIKE wildcards are literal
        assert!(repo.search("%", 20).await.unwrap().is_empty());
        assert_eq!(repo.search("s", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_profile_stats() {
        let db = create_test_db().await;
        let alice = create_user(&db, 1).await;
        let bob = create_user(&db, 2).await;
        create_image(&db, &alice.id, "a/1.png", 40).await;
        create_image(&db, &alice.id, "a/2.png", 35).await;
        db.follows().toggle(&bob.id, &alice.id).await.unwrap();

        let stats = db.users().profile_stats(&alice.id).await.unwrap();
        assert_eq!(
            stats,
            ProfileStats {
                follower_count: 1,
                following_count: 0,
                image_count: 2,
                total_aura_score: 75,
            }
        );
    }

    #[tokio::test]
    async fn test_delete_missing_user() {
        let db = create_test_db().await;
        let err = db.users().delete("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
