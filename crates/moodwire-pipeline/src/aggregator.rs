//! Aggregation: dedup, window filter, scoring, ranking, the mood statistic.
//!
//! Order matters. Dedup runs before the window filter because identity
//! resolution is independent of the window; the filter is the authority on
//! window membership because parallel collection over-fetches past the
//! boundary by design.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use moodwire_core::mood_label;
use moodwire_sentiment::SentimentScorer;
use moodwire_store::{Item, RunAggregate, RunStatus, RunStore};

use crate::error::PipelineError;
use crate::types::{AggregateOutcome, MoodSummary, RankedItem, SentimentCategory};

/// An item with its derived sentiment, pre-ranking.
#[derive(Debug, Clone)]
pub struct ScoredItem {
    pub item: Item,
    pub sentiment_score: f32,
    pub category: SentimentCategory,
}

/// Collapse duplicate `external_id`s, keeping the highest-engagement copy.
///
/// Ties keep the first-seen copy, and survivors keep first-seen order, so
/// running this twice is a no-op.
#[must_use]
pub fn dedup_items(items: Vec<Item>) -> Vec<Item> {
    let mut kept: Vec<Item> = Vec::with_capacity(items.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::with_capacity(items.len());

    for item in items {
        match index_by_id.entry(item.external_id.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(kept.len());
                kept.push(item);
            }
            Entry::Occupied(slot) => {
                let existing = &mut kept[*slot.get()];
                if item.engagement() > existing.engagement() {
                    *existing = item;
                }
            }
        }
    }

    kept
}

/// Keep only items inside the closed window `[start, end]`.
///
/// Items past the start are expected (round-level over-fetch); items past
/// the end would make retried aggregation nondeterministic, so both go.
#[must_use]
pub fn filter_window(
    items: Vec<Item>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item.created_at >= start && item.created_at <= end)
        .collect()
}

/// Score every item through the scorer seam.
///
/// A single failing score degrades that item to neutral; the whole batch
/// failing means the scorer is unreachable and the stage must not pretend
/// otherwise.
fn score_items<Sc: SentimentScorer + ?Sized>(
    scorer: &Sc,
    items: Vec<Item>,
) -> Result<Vec<ScoredItem>, PipelineError> {
    let total = items.len();
    let mut failures = 0usize;

    let scored: Vec<ScoredItem> = items
        .into_iter()
        .map(|item| {
            let sentiment_score = match scorer.score(&item.text) {
                Ok(score) => score.clamp(-1.0, 1.0),
                Err(error) => {
                    failures += 1;
                    tracing::warn!(
                        external_id = %item.external_id,
                        error = %error,
                        "scoring failed — defaulting to neutral"
                    );
                    0.0
                }
            };
            ScoredItem {
                category: SentimentCategory::from_score(f64::from(sentiment_score)),
                sentiment_score,
                item,
            }
        })
        .collect();

    if total > 0 && failures == total {
        return Err(PipelineError::AggregationFailed(format!(
            "sentiment scorer failed for all {total} items"
        )));
    }

    Ok(scored)
}

/// Rank by raw engagement, descending, and keep the top `n`.
///
/// The sort is stable, so equal engagement keeps encounter order. Ranking
/// deliberately ignores sentiment: raw engagement is auditable.
#[must_use]
pub fn rank_top(scored: &[ScoredItem], n: usize) -> Vec<RankedItem> {
    let mut order: Vec<&ScoredItem> = scored.iter().collect();
    order.sort_by(|a, b| b.item.engagement().cmp(&a.item.engagement()));

    order
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(index, scored)| RankedItem {
            rank: index + 1,
            external_id: scored.item.external_id.clone(),
            content_id: scored.item.content_id.clone(),
            author_handle: scored.item.author_handle.clone(),
            text: scored.item.text.clone(),
            created_at: scored.item.created_at,
            like_count: scored.item.like_count,
            repost_count: scored.item.repost_count,
            reply_count: scored.item.reply_count,
            engagement: scored.item.engagement(),
            sentiment_score: scored.sentiment_score,
            sentiment_category: scored.category,
        })
        .collect()
}

/// Run the aggregation stage for a collected run and persist the result.
///
/// Idempotent against re-invocation: a run that already completed has its
/// stored aggregate read back instead of being recomputed.
///
/// # Errors
///
/// [`PipelineError::AggregationFailed`] when the scorer is unreachable for
/// the whole batch or the run previously failed; [`PipelineError::Store`]
/// when the store gives out. The caller owns marking the run `failed`.
pub async fn aggregate_run<St, Sc>(
    store: &St,
    scorer: &Sc,
    run_id: Uuid,
    top_n: usize,
) -> Result<AggregateOutcome, PipelineError>
where
    St: RunStore + ?Sized,
    Sc: SentimentScorer + ?Sized,
{
    let run = store.get_run(run_id).await?;
    match run.status {
        RunStatus::Completed => return outcome_from_completed_run(&run),
        RunStatus::Failed => {
            return Err(PipelineError::AggregationFailed(format!(
                "run {run_id} is in failed status"
            )))
        }
        RunStatus::Running => {}
    }

    let raw = store.list_items(run_id).await?;
    let raw_count = raw.len();
    let deduped = dedup_items(raw);
    let deduped_count = deduped.len();
    let filtered = filter_window(deduped, run.window_start, run.window_end);

    tracing::info!(
        run_id = %run_id,
        raw = raw_count,
        deduped = deduped_count,
        in_window = filtered.len(),
        "aggregation input"
    );

    if filtered.is_empty() {
        // A quiet window is a normal outcome; the run completes empty.
        store
            .mark_completed(
                run_id,
                &RunAggregate {
                    item_count: 0,
                    average_compound: None,
                    mood_label: None,
                    top_items: serde_json::json!([]),
                },
            )
            .await?;
        return Ok(AggregateOutcome::Quiet);
    }

    let scored = score_items(scorer, filtered)?;

    // The mean runs over the full filtered set, not the top N: "what the
    // community feels" and "what the loudest posts feel" are different
    // signals, and this statistic is the former.
    #[allow(clippy::cast_precision_loss)]
    let average_compound = scored
        .iter()
        .map(|s| f64::from(s.sentiment_score))
        .sum::<f64>()
        / scored.len() as f64;
    let net_sentiment_percent = average_compound * 100.0;
    let mood = mood_label(net_sentiment_percent);
    let top_items = rank_top(&scored, top_n);

    let stored_top = serde_json::to_value(&top_items).map_err(|e| {
        PipelineError::AggregationFailed(format!("failed to serialize top items: {e}"))
    })?;
    store
        .mark_completed(
            run_id,
            &RunAggregate {
                item_count: i32::try_from(scored.len()).unwrap_or(i32::MAX),
                average_compound: Some(average_compound),
                mood_label: Some(mood.to_owned()),
                top_items: stored_top,
            },
        )
        .await?;

    Ok(AggregateOutcome::Summary(MoodSummary {
        item_count: scored.len(),
        average_compound,
        net_sentiment_percent,
        category: SentimentCategory::from_score(average_compound),
        mood,
        window_minutes: (run.window_end - run.window_start).num_minutes(),
        top_items,
    }))
}

/// Rebuild the outcome of a run that already finished aggregation.
fn outcome_from_completed_run(
    run: &moodwire_store::Run,
) -> Result<AggregateOutcome, PipelineError> {
    let item_count = run.item_count.unwrap_or(0);
    if item_count == 0 {
        return Ok(AggregateOutcome::Quiet);
    }

    let average_compound = run.average_compound.unwrap_or(0.0);
    let top_items: Vec<RankedItem> = run
        .top_items
        .clone()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| {
            PipelineError::AggregationFailed(format!("stored top items are unreadable: {e}"))
        })?
        .unwrap_or_default();

    Ok(AggregateOutcome::Summary(MoodSummary {
        item_count: usize::try_from(item_count).unwrap_or(0),
        average_compound,
        net_sentiment_percent: average_compound * 100.0,
        category: SentimentCategory::from_score(average_compound),
        mood: mood_label(average_compound * 100.0),
        window_minutes: (run.window_end - run.window_start).num_minutes(),
        top_items,
    }))
}
