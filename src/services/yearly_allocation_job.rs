use anyhow::Context;
use chrono::Utc;
use log::{error, info};
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::services::credit_manager::CreditManager;

/// Starts the scheduler that advances yearly allocations.
///
/// The job runs on `schedule` (six-field cron, UTC) and hands today's date to
/// [`CreditManager::run_yearly_allocation`]; a missed run is caught up by the
/// next one because due users are selected by `next_credit_date <= today`.
pub async fn start_yearly_allocation_job(credits: CreditManager, schedule: &str) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new()
        .await
        .context("failed to create job scheduler")?;

    let job = Job::new_async(schedule, move |_id, _scheduler| {
        let credits = credits.clone();
        Box::pin(async move {
            let today = Utc::now().date_naive();
            match credits.run_yearly_allocation(today).await {
                Ok(summary) if summary.failed > 0 => {
                    error!("Yearly allocation for {} left {} users unallocated", today, summary.failed)
                }
                Ok(_) => {}
                Err(e) => error!("Yearly allocation run for {} failed: {}", today, e),
            }
        })
    })
    .with_context(|| format!("invalid yearly allocation schedule '{}'", schedule))?;

    scheduler
        .add(job)
        .await
        .context("failed to register yearly allocation job")?;
    scheduler
        .start()
        .await
        .context("failed to start job scheduler")?;

    info!("Yearly allocation job scheduled with '{}'", schedule);
    Ok(scheduler)
}
