//! Run coordination: duplicate-run suppression and driving the
//! collect → aggregate → publish state machine.
//!
//! [`run_cycle`] runs the whole machine in-process. The same contracts work
//! chained: an external scheduler can call [`start_run`], then
//! [`Collector::collect_step`] per invocation, then [`check_completion`] and
//! [`aggregate_run`] — state lives in the store either way.

use std::sync::Arc;

use uuid::Uuid;

use moodwire_feed::SearchSource;
use moodwire_sentiment::SentimentScorer;
use moodwire_store::{Run, RunStatus, RunStore, StoreError};

use crate::aggregator::aggregate_run;
use crate::collector::Collector;
use crate::error::PipelineError;
use crate::report::{format_quiet, format_summary, PublishReceipt, Publisher};
use crate::types::{AggregateOutcome, MoodSummary, PipelineConfig};

/// What one pipeline cycle produced.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: RunOutcome,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// The idempotency key matched a run that already finished — the
    /// schedule tick was handled by someone else.
    Duplicate(RunStatus),
    /// Empty window. Completed normally, nothing published.
    Quiet,
    /// Dry run: summary computed, publish skipped.
    Summarized(MoodSummary),
    Published(MoodSummary, PublishReceipt),
}

/// Create (or adopt) the run for this cycle.
///
/// Duplicate-run suppression is this function's job, not the store's: an
/// idempotency key that already has a run returns that run, including when
/// two invocations race on the same tick and one loses the unique-key
/// insert.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] when the store gives out.
pub async fn start_run<St: RunStore + ?Sized>(
    store: &St,
    window_minutes: i64,
    query: &str,
    idempotency_key: Option<&str>,
) -> Result<Run, PipelineError> {
    if let Some(key) = idempotency_key {
        if let Some(existing) = store.find_run_by_idempotency_key(key).await? {
            tracing::info!(
                run_id = %existing.run_id,
                key,
                status = %existing.status,
                "idempotency key already has a run — adopting it"
            );
            return Ok(existing);
        }
    }

    match store.create_run(window_minutes, query, idempotency_key).await {
        Ok(run) => {
            tracing::info!(
                run_id = %run.run_id,
                window_minutes,
                query,
                "created run"
            );
            Ok(run)
        }
        Err(StoreError::IdempotencyConflict(key)) => {
            // Lost a same-tick race; adopt the winner's run.
            store
                .find_run_by_idempotency_key(&key)
                .await?
                .ok_or(PipelineError::Store(StoreError::NotFound))
        }
        Err(e) => Err(e.into()),
    }
}

/// Whether the collection stage of a run is over — for schedulers that
/// re-invoke the coordinator instead of looping in-process.
///
/// # Errors
///
/// Returns [`PipelineError::Store`] when the store gives out.
pub async fn check_completion<St: RunStore + ?Sized>(
    store: &St,
    run_id: Uuid,
) -> Result<bool, PipelineError> {
    Ok(store.get_run(run_id).await?.collection_done())
}

/// Drive one full cycle: start/adopt a run, collect to a stopping
/// condition, aggregate, publish.
///
/// A `running` run found under the idempotency key is resumed, which is
/// safe: appends are additive and the aggregator dedups.
///
/// # Errors
///
/// - [`PipelineError::CollectionFailed`] / [`PipelineError::AggregationFailed`]
///   mark the run `failed` (best effort) before propagating.
/// - [`PipelineError::PublishFailed`] leaves the run `completed` — the
///   aggregate is durable; only delivery failed.
pub async fn run_cycle<St, So, Sc, P>(
    store: &St,
    source: Arc<So>,
    scorer: &Sc,
    publisher: &P,
    config: &PipelineConfig,
    idempotency_key: Option<&str>,
) -> Result<RunReport, PipelineError>
where
    St: RunStore + ?Sized,
    So: SearchSource + 'static,
    Sc: SentimentScorer + ?Sized,
    P: Publisher + ?Sized,
{
    let run = start_run(store, config.window_minutes, &config.query, idempotency_key).await?;

    if run.status != RunStatus::Running {
        return Ok(RunReport {
            run_id: run.run_id,
            outcome: RunOutcome::Duplicate(run.status),
        });
    }

    drive_run(store, source, scorer, publisher, config, run.run_id).await
}

/// Drive an already-created `running` run through collect → aggregate →
/// publish. Useful when run creation and execution are decoupled (an HTTP
/// handler answers with the run id, a background task does the work).
///
/// # Errors
///
/// Same contract as [`run_cycle`].
pub async fn drive_run<St, So, Sc, P>(
    store: &St,
    source: Arc<So>,
    scorer: &Sc,
    publisher: &P,
    config: &PipelineConfig,
    run_id: Uuid,
) -> Result<RunReport, PipelineError>
where
    St: RunStore + ?Sized,
    So: SearchSource + 'static,
    Sc: SentimentScorer + ?Sized,
    P: Publisher + ?Sized,
{
    let collector = Collector::new(source, config.collector.clone());
    match collector.collect(store, run_id).await {
        Ok(reason) => {
            tracing::info!(run_id = %run_id, reason = ?reason, "collection finished");
        }
        Err(error) => {
            fail_run_best_effort(store, run_id, &error.to_string()).await;
            return Err(error);
        }
    }

    let outcome = match aggregate_run(store, scorer, run_id, config.top_n).await {
        Ok(outcome) => outcome,
        Err(error) => {
            fail_run_best_effort(store, run_id, &error.to_string()).await;
            return Err(error);
        }
    };

    match outcome {
        AggregateOutcome::Quiet => {
            tracing::info!(run_id = %run_id, "{}", format_quiet(config.window_minutes));
            Ok(RunReport {
                run_id,
                outcome: RunOutcome::Quiet,
            })
        }
        AggregateOutcome::Summary(summary) => {
            let text = format_summary(&summary);
            if config.dry_run {
                tracing::info!(run_id = %run_id, summary = %text, "dry run — skipping publish");
                return Ok(RunReport {
                    run_id,
                    outcome: RunOutcome::Summarized(summary),
                });
            }
            match publisher.publish(&text, &summary.top_items).await {
                Ok(receipt) => Ok(RunReport {
                    run_id,
                    outcome: RunOutcome::Published(summary, receipt),
                }),
                Err(error) => {
                    // The run stays completed: its aggregate is durable and
                    // correct, only delivery failed.
                    tracing::error!(run_id = %run_id, error = %error, "publish failed");
                    Err(match error {
                        e @ PipelineError::PublishFailed(_) => e,
                        other => PipelineError::PublishFailed(other.to_string()),
                    })
                }
            }
        }
    }
}

/// Mark a run failed, logging instead of propagating when even that fails
/// (the store may be the thing that is down).
async fn fail_run_best_effort<St: RunStore + ?Sized>(store: &St, run_id: Uuid, reason: &str) {
    if let Err(error) = store.mark_failed(run_id, reason).await {
        tracing::warn!(
            run_id = %run_id,
            error = %error,
            "could not mark run as failed"
        );
    }
}
