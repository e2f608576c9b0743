//! ABOUTME: Maintenance job bodies shared by the cron scheduler and the CLI
//! ABOUTME: Each job is a plain async function over the database

use au_core::{unix_now, MonotonicTimer, Result};
use au_db::Db;
use tracing::{info, instrument};

/// Delete OTP rows whose expiry has passed; returns rows removed
#[instrument(skip(db))]
pub async fn cleanup_expired_otps(db: &Db) -> Result<u64> {
    let timer = MonotonicTimer::new();
    let removed = db.otps().delete_expired(unix_now()).await?;

    info!(
        removed,
        elapsed_ms = timer.elapsed_ms(),
        "Expired OTP cleanup finished"
    );
    Ok(removed)
}

/// Recompute and store the leaderboard; returns ranked users
#[instrument(skip(db))]
pub async fn refresh_leaderboard(db: &Db) -> Result<usize> {
    let timer = MonotonicTimer::new();
    let ranked = db.leaderboard().recompute().await?;

    info!(
        ranked,
        elapsed_ms = timer.elapsed_ms(),
        "Leaderboard refresh finished"
    );
    Ok(ranked)
}
