//! ABOUTME: Aura API entry point
//! ABOUTME: Parses the command line, loads configuration and runs servers or maintenance tasks

use au_config::Config;
use au_core::{telemetry, Result};
use au_db::{Db, DbOptions};
use au_obs::{Metrics, ObsState};
use au_scheduler::{cleanup_expired_otps, refresh_leaderboard, MaintenanceScheduler};
use au_web::AppState;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "aura", version, about = "Aura API server and maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the API and observability servers (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
    /// Delete expired one-time codes once
    CleanupOtps,
    /// Recompute the leaderboard once
    RefreshLeaderboard,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            telemetry::init_tracing("development", "aura");
            tracing::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.environment, "aura");
    tracing::debug!(?config, "Configuration loaded successfully");

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Migrate => migrate(&config).await,
        Command::CleanupOtps => cleanup_otps(&config).await,
        Command::RefreshLeaderboard => rebuild_leaderboard(&config).await,
    };

    if let Err(e) = result {
        tracing::error!("aura exited with error: {}", e);
        process::exit(1);
    }
}

async fn open_db(config: &Config) -> Result<Db> {
    let options = DbOptions {
        max_connections: config.database.pool_size,
        wal: config.database.sqlite_wal,
    };
    let db = Db::with_options(&config.database.path, options).await?;
    db.health_check().await?;
    tracing::info!(db_path = %config.database.path, "Database initialized");
    Ok(db)
}

/// Opening the database applies pending migrations
async fn migrate(config: &Config) -> Result<()> {
    open_db(config).await?;
    tracing::info!("Migrations applied");
    Ok(())
}

async fn cleanup_otps(config: &Config) -> Result<()> {
    let db = open_db(config).await?;
    let removed = cleanup_expired_otps(&db).await?;
    tracing::info!(removed, "Expired codes removed");
    Ok(())
}

async fn rebuild_leaderboard(config: &Config) -> Result<()> {
    let db = open_db(config).await?;
    let ranked = refresh_leaderboard(&db).await?;
    tracing::info!(ranked, "Leaderboard rebuilt");
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = %config.server.port,
        obs_port = %config.server.obs_port,
        storage = ?config.storage.provider,
        ai = ?config.ai.provider,
        "Starting Aura API"
    );

    let db = open_db(&config).await?;
    let metrics = Arc::new(Metrics::new());
    let obs_state = ObsState::with_metrics(metrics.clone());
    let app_state = AppState::from_config(&config, db.clone(), metrics.clone())?;

    let scheduler = MaintenanceScheduler::new(db, config.scheduler.clone())
        .await?
        .with_metrics(metrics);
    scheduler.start().await?;

    let obs_bind_addr = format!("0.0.0.0:{}", config.server.obs_port);
    let web_bind_addr = format!("{}:{}", config.server.host, config.server.port);

    let (obs_server, obs_addr) = au_obs::bind_server(&obs_bind_addr, obs_state.clone())?;
    let (web_server, web_addr) = au_web::bind_server(&web_bind_addr, app_state)?;

    obs_state.readiness.set_ready(true);
    tracing::info!(%web_addr, %obs_addr, "Aura API ready");

    let result = tokio::select! {
        obs_result = obs_server => {
            tracing::error!("Observability server exited");
            obs_result.map_err(au_core::Error::from)
        }
        web_result = web_server => {
            tracing::info!("Web server stopped");
            web_result.map_err(au_core::Error::from)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
    };

    obs_state.readiness.set_ready(false);
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler shutdown failed: {}", e);
    }

    result
}
