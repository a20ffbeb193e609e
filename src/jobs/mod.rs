//! Background jobs for the license server.
//!
//! # Available Jobs
//!
//! - **Remote Sync**: pushes the local license table to the remote registry,
//!   once shortly after start-up and then on a fixed interval. Scheduling
//!   requires the `background-jobs` feature; the sync functions themselves
//!   are always available to the server.
//!
//! # Usage
//!
//! ```rust,ignore
//! use licensehub::jobs::{JobConfig, JobScheduler};
//!
//! let scheduler = JobScheduler::new(db, remote, JobConfig::from(&config.remote)).await?;
//! scheduler.start().await?;
//! ```

#[cfg(feature = "background-jobs")]
use std::sync::Arc;
#[cfg(feature = "background-jobs")]
use std::time::Duration;
#[cfg(feature = "background-jobs")]
use tokio_cron_scheduler::{Job, JobScheduler as TokioJobScheduler};
#[cfg(feature = "background-jobs")]
use tracing::{error, info};

use crate::config::RemoteConfig;
#[cfg(feature = "background-jobs")]
use crate::server::database::Database;
#[cfg(feature = "background-jobs")]
use crate::server::remote::RemoteRegistry;

mod remote_sync;

pub use remote_sync::{migrate_all_licenses, run_remote_sync};

/// Configuration for background jobs.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Seconds between full syncs (default: 900)
    pub sync_interval_secs: u64,
    /// Seconds to wait after start-up before the first sync (default: 5)
    pub initial_delay_secs: u64,
    /// Maximum number of licenses pushed per sync (default: 1000)
    pub sync_batch_limit: i64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: 900,
            initial_delay_secs: 5,
            sync_batch_limit: 1000,
        }
    }
}

impl From<&RemoteConfig> for JobConfig {
    fn from(remote: &RemoteConfig) -> Self {
        Self {
            sync_interval_secs: remote.sync_interval_secs,
            sync_batch_limit: remote.sync_batch_limit,
            ..Self::default()
        }
    }
}

/// Background job scheduler for the license server.
#[cfg(feature = "background-jobs")]
pub struct JobScheduler {
    scheduler: TokioJobScheduler,
    db: Arc<Database>,
    remote: Arc<RemoteRegistry>,
    config: JobConfig,
}

#[cfg(feature = "background-jobs")]
impl JobScheduler {
    /// Create a new job scheduler.
    pub async fn new(
        db: Arc<Database>,
        remote: Arc<RemoteRegistry>,
        config: JobConfig,
    ) -> Result<Self, JobError> {
        let scheduler = TokioJobScheduler::new()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        Ok(Self {
            scheduler,
            db,
            remote,
            config,
        })
    }

    /// Register the sync jobs and start the scheduler.
    pub async fn start(&self) -> Result<(), JobError> {
        info!("Starting license server job scheduler");

        self.add_remote_sync_jobs().await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;

        info!("Job scheduler started successfully");

        Ok(())
    }

    /// Stop the job scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobError> {
        info!("Shutting down job scheduler");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        Ok(())
    }

    fn sync_job(&self, repeated: bool) -> Result<Job, JobError> {
        let db = Arc::clone(&self.db);
        let remote = Arc::clone(&self.remote);
        let limit = self.config.sync_batch_limit;

        let run = move |_uuid: uuid::Uuid, _l: TokioJobScheduler| {
            let db = Arc::clone(&db);
            let remote = Arc::clone(&remote);
            Box::pin(async move {
                if let Err(e) = run_remote_sync(&db, &remote, limit).await {
                    error!("Scheduled sync error: {}", e);
                }
            }) as std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>
        };

        let job = if repeated {
            Job::new_repeated_async(Duration::from_secs(self.config.sync_interval_secs), run)
        } else {
            Job::new_one_shot_async(Duration::from_secs(self.config.initial_delay_secs), run)
        };

        job.map_err(|e| JobError::SchedulerError(e.to_string()))
    }

    /// Add the start-up sync and the periodic sync.
    async fn add_remote_sync_jobs(&self) -> Result<(), JobError> {
        for repeated in [false, true] {
            let job = self.sync_job(repeated)?;
            self.scheduler
                .add(job)
                .await
                .map_err(|e| JobError::SchedulerError(e.to_string()))?;
        }

        info!(
            "Added remote sync job (first run in {}s, then every {}s, up to {} licenses)",
            self.config.initial_delay_secs,
            self.config.sync_interval_secs,
            self.config.sync_batch_limit
        );

        Ok(())
    }
}

/// Errors that can occur in the job scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Job execution error: {0}")]
    ExecutionError(String),
}

impl From<crate::errors::LicenseError> for JobError {
    fn from(err: crate::errors::LicenseError) -> Self {
        JobError::DatabaseError(err.to_string())
    }
}
