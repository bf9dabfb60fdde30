//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the
//! recurring mood tick plus the retention purge.

use std::sync::Arc;

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use moodwire_core::AppConfig;
use moodwire_feed::SearchClient;
use moodwire_pipeline::{run_cycle, LogPublisher, PipelineConfig, RunOutcome};
use moodwire_sentiment::LexiconScorer;
use moodwire_store::{PgRunStore, RunStore};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    store: PgRunStore,
    source: Arc<SearchClient>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_mood_tick_job(&scheduler, store.clone(), source, Arc::clone(&config)).await?;
    register_purge_job(&scheduler, store).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the recurring mood tick on the configured cron schedule.
///
/// The idempotency key is derived from the tick's wall-clock minute, so a
/// restart mid-tick (or two schedulers racing) collapses onto one run.
async fn register_mood_tick_job(
    scheduler: &JobScheduler,
    store: PgRunStore,
    source: Arc<SearchClient>,
    config: Arc<AppConfig>,
) -> Result<(), JobSchedulerError> {
    let store = Arc::new(store);
    let schedule = config.cron_schedule.clone();

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let store = Arc::clone(&store);
        let source = Arc::clone(&source);
        let config = Arc::clone(&config);

        Box::pin(async move {
            tracing::info!("scheduler: starting mood tick");
            run_mood_tick(&store, source, &config).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// One scheduled cycle. Every failure is scoped to this run — the
/// scheduler itself never dies over a bad tick.
async fn run_mood_tick(store: &PgRunStore, source: Arc<SearchClient>, config: &AppConfig) {
    let key = format!("cron-{}", Utc::now().format("%Y-%m-%dT%H:%M"));
    let pipeline_config = PipelineConfig::from_app_config(config);

    match run_cycle(
        store,
        source,
        &LexiconScorer,
        &LogPublisher,
        &pipeline_config,
        Some(&key),
    )
    .await
    {
        Ok(report) => match report.outcome {
            RunOutcome::Duplicate(status) => {
                tracing::info!(
                    run_id = %report.run_id,
                    status = %status,
                    "scheduler: tick already handled"
                );
            }
            RunOutcome::Quiet => {
                tracing::info!(run_id = %report.run_id, "scheduler: quiet window, nothing to publish");
            }
            RunOutcome::Summarized(summary) => {
                tracing::info!(
                    run_id = %report.run_id,
                    mood = summary.mood,
                    items = summary.item_count,
                    "scheduler: dry run complete"
                );
            }
            RunOutcome::Published(summary, receipt) => {
                tracing::info!(
                    run_id = %report.run_id,
                    mood = summary.mood,
                    items = summary.item_count,
                    post_id = %receipt.post_id,
                    "scheduler: mood summary published"
                );
            }
        },
        Err(error) => {
            tracing::error!(error = %error, "scheduler: mood tick failed");
        }
    }
}

/// Register the daily retention purge (03:13 UTC, off the busy minutes).
async fn register_purge_job(
    scheduler: &JobScheduler,
    store: PgRunStore,
) -> Result<(), JobSchedulerError> {
    let store = Arc::new(store);

    let job = Job::new_async("0 13 3 * * *", move |_uuid, _lock| {
        let store = Arc::clone(&store);

        Box::pin(async move {
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::info!(purged, "scheduler: purged expired runs");
                }
                Err(error) => {
                    tracing::warn!(error = %error, "scheduler: retention purge failed");
                }
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
