//! ABOUTME: Background maintenance scheduler built on tokio-cron-scheduler
//! ABOUTME: Runs expired-OTP cleanup and leaderboard refresh on cron schedules

use std::str::FromStr;
use std::sync::Arc;

use au_config::SchedulerSettings;
use au_core::{Error, Result};
use au_db::Db;
use au_obs::Metrics;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

pub mod jobs;

pub use jobs::{cleanup_expired_otps, refresh_leaderboard};

/// Owns the cron scheduler and the two maintenance jobs
pub struct MaintenanceScheduler {
    cron_scheduler: Mutex<JobScheduler>,
    settings: SchedulerSettings,
    db: Db,
    metrics: Option<Arc<Metrics>>,
}

impl MaintenanceScheduler {
    pub async fn new(db: Db, settings: SchedulerSettings) -> Result<Self> {
        let cron_scheduler = JobScheduler::new()
            .await
            .map_err(|e| Error::Config(format!("Failed to create cron scheduler: {}", e)))?;

        Ok(Self {
            cron_scheduler: Mutex::new(cron_scheduler),
            settings,
            db,
            metrics: None,
        })
    }

    /// Count leaderboard refreshes in the shared registry
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register both jobs and start ticking; no-op when disabled
    pub async fn start(&self) -> Result<()> {
        if !self.settings.enabled {
            info!("Maintenance scheduler disabled");
            return Ok(());
        }

        let otp_job = {
            let db = self.db.clone();
            Self::cron_job(&self.settings.otp_cleanup_cron, move || {
                let db = db.clone();
                async move {
                    if let Err(e) = cleanup_expired_otps(&db).await {
                        error!(error = %e, "Expired OTP cleanup failed");
                    }
                }
            })?
        };

        let leaderboard_job = {
            let db = self.db.clone();
            let metrics = self.metrics.clone();
            Self::cron_job(&self.settings.leaderboard_cron, move || {
                let db = db.clone();
                let metrics = metrics.clone();
                async move {
                    match refresh_leaderboard(&db).await {
                        Ok(_) => {
                            if let Some(metrics) = metrics {
                                metrics.inc_leaderboard_refresh();
                            }
                        }
                        Err(e) => error!(error = %e, "Leaderboard refresh failed"),
                    }
                }
            })?
        };

        let scheduler = self.cron_scheduler.lock().await;
        for job in [otp_job, leaderboard_job] {
            scheduler
                .add(job)
                .await
                .map_err(|e| Error::Config(format!("Failed to add cron job: {}", e)))?;
        }

        scheduler
            .start()
            .await
            .map_err(|e| Error::Config(format!("Failed to start scheduler: {}", e)))?;

        info!(
            otp_cleanup = %self.settings.otp_cleanup_cron,
            leaderboard = %self.settings.leaderboard_cron,
            "Maintenance scheduler started"
        );
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.cron_scheduler.lock().await;
        scheduler
            .shutdown()
            .await
            .map_err(|e| Error::Config(format!("Failed to stop scheduler: {}", e)))?;

        info!("Maintenance scheduler stopped");
        Ok(())
    }

    fn cron_job<F, Fut>(schedule: &str, run: F) -> Result<CronJob>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        cron::Schedule::from_str(schedule)
            .map_err(|e| Error::Config(format!("Invalid cron expression '{}': {}", schedule, e)))?;

        let run = Arc::new(run);
        let label = schedule.to_string();
        CronJob::new_async(schedule, move |_uuid, _scheduler| {
            let run = Arc::clone(&run);
            let label = label.clone();
            Box::pin(async move {
                debug!(schedule = %label, "Running maintenance job");
                run().await;
            })
        })
        .map_err(|e| Error::Config(format!("Failed to create cron job: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Db {
        let path = test_support::unique_db_path("au_scheduler_lib");
        Db::new(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let scheduler = MaintenanceScheduler::new(test_db().await, SchedulerSettings::default())
            .await
            .unwrap()
            .with_metrics(Arc::new(Metrics::new()));

        scheduler.start().await.unwrap();
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_cron_rejected() {
        let settings = SchedulerSettings {
            otp_cleanup_cron: "every five minutes".to_string(),
            ..SchedulerSettings::default()
        };
        let scheduler = MaintenanceScheduler::new(test_db().await, settings)
            .await
            .unwrap();

        assert!(matches!(scheduler.start().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_disabled_scheduler_starts_nothing() {
        let settings = SchedulerSettings {
            enabled: false,
            otp_cleanup_cron: "not a cron".to_string(),
            ..SchedulerSettings::default()
        };
        let scheduler = MaintenanceScheduler::new(test_db().await, settings)
            .await
            .unwrap();

        assert!(scheduler.start().await.is_ok());
    }
}
