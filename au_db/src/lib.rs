//! ABOUTME: Database layer with SQLite, migrations, and repositories
//! ABOUTME: Handles all data persistence and database operations

use au_core::{Error, Result};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Sqlite, SqlitePool,
};
use tracing::{debug, info, instrument};

pub mod leaderboard;
pub mod repositories;

pub use leaderboard::{rank_standings, Standing};
pub use repositories::{
    auras::{Aura, AuraRepository, NewAura},
    follows::{FollowRepository, FollowUser},
    images::{FeedItem, Image, ImageRepository, ImageWithAura, NewImage},
    leaderboard::{LeaderboardEntry, LeaderboardRepository, LeaderboardRow},
    likes::LikeRepository,
    otps::{NewOtp, Otp, OtpRepository},
    shares::{Share, ShareRepository},
    users::{ProfileStats, UpdateProfile, User, UserRepository},
};

/// Pool sizing and journal options
#[derive(Debug, Clone)]
pub struct DbOptions {
    pub max_connections: u32,
    pub wal: bool,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            wal: true,
        }
    }
}

/// Limit/offset window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Clamp caller-supplied values into a usable window
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit
                .unwrap_or(Self::DEFAULT_LIMIT)
                .clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Map a sqlx error, surfacing constraint violations as conflicts
pub(crate) fn db_error(context: &str, err: sqlx::Error) -> Error {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return Error::Conflict(format!("{}: already exists", context));
        }
        if db_err.is_foreign_key_violation() {
            return Error::NotFound(format!("{}: referenced row missing", context));
        }
    }
    Error::Database(format!("{}: {}", context, err))
}

/// Database connection pool and operations
#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Create a new database connection with default options and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        Self::with_options(db_path, DbOptions::default()).await
    }

    #[instrument(skip(db_path))]
    pub async fn with_options(db_path: &str, options: DbOptions) -> Result<Self> {
        info!("Initializing database at: {}", db_path);

        let database_url = format!("sqlite://{}", db_path);
        if !Sqlite::database_exists(&database_url)
            .await
            .unwrap_or(false)
        {
            info!("Creating database: {}", database_url);
            Sqlite::create_database(&database_url)
                .await
                .map_err(|e| Error::Database(format!("Failed to create database: {}", e)))?;
        }

        let journal_mode = if options.wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let connect_options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(journal_mode)
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL")
            .pragma("temp_store", "memory")
            .pragma("busy_timeout", "30000");

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(1)
            .connect_with(connect_options)
            .await
            .map_err(|e| Error::Database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.migrate().await?;

        info!("Database initialized successfully");
        Ok(db)
    }

    /// Run embedded migrations
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a Db instance from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        debug!("Performing database health check");

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;

        Ok(())
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    pub fn otps(&self) -> OtpRepository<'_> {
        OtpRepository::new(&self.pool)
    }

    pub fn images(&self) -> ImageRepository<'_> {
        ImageRepository::new(&self.pool)
    }

    pub fn auras(&self) -> AuraRepository<'_> {
        AuraRepository::new(&self.pool)
    }

    pub fn follows(&self) -> FollowRepository<'_> {
        FollowRepository::new(&self.pool)
    }

    pub fn likes(&self) -> LikeRepository<'_> {
        LikeRepository::new(&self.pool)
    }

    pub fn shares(&self) -> ShareRepository<'_> {
        ShareRepository::new(&self.pool)
    }

    pub fn leaderboard(&self) -> LeaderboardRepository<'_> {
        LeaderboardRepository::new(&self.pool)
    }
}

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;

    /// Fresh migrated database in the temp dir
    pub async fn create_test_db() -> Db {
        let path = test_support::unique_db_path("au_db");
        Db::new(path.to_str().expect("temp path is utf-8"))
            .await
            .expect("Failed to create test database")
    }

    pub async fn create_user(db: &Db, n: u32) -> User {
        db.users()
            .create(&test_support::test_phone(n))
            .await
            .expect("Failed to create user")
    }

    pub fn new_image(user_id: &str, key: &str) -> NewImage {
        NewImage {
            user_id: user_id.to_string(),
            url: format!("http://localhost/media/{}", key),
            thumbnail_url: None,
            public_id: key.to_string(),
            provider: "local".to_string(),
            content_type: "image/png".to_string(),
            size_bytes: 128,
            original_filename: Some("photo.png".to_string()),
        }
    }

    pub fn new_aura(score: i64) -> NewAura {
        NewAura {
            caption: "Golden hour calm".to_string(),
            mood: "serene".to_string(),
            color: "#FFAA00".to_string(),
            score,
            tags: vec!["sunset".to_string()],
            model: "stub".to_string(),
        }
    }

    pub async fn create_image(db: &Db, user_id: &str, key: &str, score: i64) -> ImageWithAura {
        db.images()
            .create_with_aura(new_image(user_id, key), new_aura(score))
            .await
            .expect("Failed to create image")
    }
}
