//! Recurring scrape-and-persist runs.
//!
//! Runs fire on a cron schedule (hourly by default, at the top of the hour).
//! A run that is still in flight when the next one fires is not waited for,
//! so two runs may overlap. Failed runs are logged and the schedule carries
//! on.

use std::sync::Arc;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{error, info, instrument};

use crate::error::{Result, ScrapeError};
use crate::pipeline::{RunMode, SourcePipeline};

/// Every hour, on the hour. Six fields: seconds first.
pub const HOURLY: &str = "0 0 * * * *";

fn scheduler_error(e: JobSchedulerError) -> ScrapeError {
    ScrapeError::Config(format!("scheduler: {e}"))
}

/// A started schedule. Dropping it without [`ScrapeScheduler::stop`] leaves
/// the jobs running until the runtime shuts down.
pub struct ScrapeScheduler {
    inner: JobScheduler,
}

impl ScrapeScheduler {
    /// Register the recurring run on `schedule` and start ticking.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Config`] if `schedule` is not a valid cron expression
    /// or the scheduler cannot start.
    #[instrument(level = "info", skip(pipeline))]
    pub async fn start(pipeline: Arc<SourcePipeline>, schedule: &str) -> Result<Self> {
        let inner = JobScheduler::new().await.map_err(scheduler_error)?;

        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                info!("Running scheduled scrape");
                match pipeline.run(RunMode::ScrapeAndPersist).await {
                    Ok(report) => info!(posts = report.results.len(), "Scheduled scrape completed"),
                    Err(e) => error!(error = %e, "Scheduled scrape failed"),
                }
            })
        })
        .map_err(scheduler_error)?;

        inner.add(job).await.map_err(scheduler_error)?;
        inner.start().await.map_err(scheduler_error)?;
        info!("Scheduler started");
        Ok(Self { inner })
    }

    #[instrument(level = "info", skip_all)]
    pub async fn stop(mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(scheduler_error)?;
        info!("Scheduler stopped");
        Ok(())
    }
}
