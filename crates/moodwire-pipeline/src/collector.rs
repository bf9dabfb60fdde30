//! Parallel fan-out collection with a boundary-detecting stop rule.
//!
//! One round fires K workers at offsets `base + i × page_size`, joins them
//! behind a deadline barrier, appends whatever arrived, and only then
//! decides whether to stop. The decision needs the *oldest* timestamp seen
//! across the whole round — the workers cover disjoint slices of a
//! newest-first result set, so the first worker to finish proves nothing.

use std::cmp;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use moodwire_feed::cursor::{cursor_offset, offset_to_cursor, offset_to_stored};
use moodwire_feed::{FeedError, FeedPost, SearchPage, SearchSource};
use moodwire_store::{Item, Run, RunStore};

use crate::error::PipelineError;
use crate::types::{CollectorConfig, StopReason};

/// Drives the collection stage of a run against a [`SearchSource`].
pub struct Collector<S> {
    source: Arc<S>,
    config: CollectorConfig,
}

/// Everything one round's barrier produced.
struct RoundFetch {
    items: Vec<Item>,
    /// Oldest parseable timestamp across all workers in the round.
    oldest: Option<DateTime<Utc>>,
    /// Workers that reported back (success or error) before the deadline.
    reported: u32,
    /// Workers that reported an error.
    failed: u32,
    timed_out: bool,
}

impl<S: SearchSource + 'static> Collector<S> {
    pub fn new(source: Arc<S>, config: CollectorConfig) -> Self {
        Self { source, config }
    }

    /// Runs rounds until a stopping condition fires, then records
    /// `has_more = false` on the run.
    ///
    /// Safe to call on a run another invocation already finished — it
    /// returns [`StopReason::AlreadyComplete`] without touching the source.
    ///
    /// # Errors
    ///
    /// [`PipelineError::CollectionFailed`] when a full round fails twice;
    /// [`PipelineError::Store`] when the run store gives out. Items appended
    /// by earlier rounds stay durable either way.
    pub async fn collect<St: RunStore + ?Sized>(
        &self,
        store: &St,
        run_id: Uuid,
    ) -> Result<StopReason, PipelineError> {
        let overall_deadline = Instant::now() + self.config.collect_budget;
        loop {
            let run = store.get_run(run_id).await?;
            if run.collection_done() {
                return Ok(StopReason::AlreadyComplete);
            }
            if let Some(reason) = self.round(store, &run, overall_deadline).await? {
                return Ok(reason);
            }
        }
    }

    /// Runs at most one round — the unit of work for externally driven
    /// invocation (a scheduler re-dispatching the coordinator). Returns
    /// `Some(reason)` once collection is over.
    ///
    /// # Errors
    ///
    /// Same contract as [`Collector::collect`].
    pub async fn collect_step<St: RunStore + ?Sized>(
        &self,
        store: &St,
        run_id: Uuid,
    ) -> Result<Option<StopReason>, PipelineError> {
        let overall_deadline = Instant::now() + self.config.collect_budget;
        let run = store.get_run(run_id).await?;
        if run.collection_done() {
            return Ok(Some(StopReason::AlreadyComplete));
        }
        self.round(store, &run, overall_deadline).await
    }

    /// One fan-out round: fetch, append, decide, persist the cursor.
    async fn round<St: RunStore + ?Sized>(
        &self,
        store: &St,
        run: &Run,
        overall_deadline: Instant,
    ) -> Result<Option<StopReason>, PipelineError> {
        let base = cursor_offset(&run.cursor).ok_or_else(|| {
            PipelineError::CollectionFailed(format!(
                "corrupt cursor '{}' on run {}",
                run.cursor, run.run_id
            ))
        })?;

        let round_deadline = cmp::min(Instant::now() + self.config.round_timeout, overall_deadline);
        let mut fetch = self.fetch_round(run, base, round_deadline).await;

        if fetch.failed == self.config.fan_out {
            tracing::warn!(
                run_id = %run.run_id,
                offset = base,
                "every worker in the round failed — retrying once"
            );
            tokio::time::sleep(self.config.round_retry_backoff).await;
            let retry_deadline =
                cmp::min(Instant::now() + self.config.round_timeout, overall_deadline);
            fetch = self.fetch_round(run, base, retry_deadline).await;
            if fetch.failed == self.config.fan_out {
                return Err(PipelineError::CollectionFailed(format!(
                    "all {} workers failed twice at offset {base}",
                    self.config.fan_out
                )));
            }
        }

        // Append before deciding anything: a crash after this point loses no
        // data, and a boundary-crossing round keeps its items (the window
        // filter at aggregation time is the authority, not the collector).
        store.append_items(run.run_id, &fetch.items).await?;

        let round_number = run.rounds_completed.saturating_add(1);
        let boundary_crossed = fetch.oldest.is_some_and(|t| t < run.window_start);
        let budget_spent = fetch.timed_out || Instant::now() >= overall_deadline;

        let stop = if boundary_crossed {
            Some(StopReason::BoundaryCrossed)
        } else if u32::try_from(round_number).unwrap_or(u32::MAX) >= self.config.max_rounds {
            Some(StopReason::RoundLimitReached)
        } else if budget_spent {
            Some(StopReason::BudgetElapsed)
        } else if fetch.items.is_empty() {
            Some(StopReason::ResultSetExhausted)
        } else {
            None
        };

        let next_offset =
            base + u64::from(self.config.fan_out) * u64::from(self.config.page_size);
        store
            .advance_cursor(run.run_id, &offset_to_stored(next_offset), stop.is_none())
            .await?;

        tracing::info!(
            run_id = %run.run_id,
            round = round_number,
            items = fetch.items.len(),
            workers_reported = fetch.reported,
            workers_failed = fetch.failed,
            stop = ?stop,
            "collection round done"
        );

        Ok(stop)
    }

    /// Fan out K workers and join them behind `deadline`.
    ///
    /// Workers past the deadline are abandoned — whatever reported in time
    /// is used. A worker error contributes an empty page; the known
    /// deep-offset rejection is just one more way for that to happen.
    async fn fetch_round(&self, run: &Run, base: u64, deadline: Instant) -> RoundFetch {
        let fan_out = self.config.fan_out;
        let (tx, mut rx) = mpsc::channel::<(u32, Result<SearchPage, FeedError>)>(
            usize::try_from(fan_out).unwrap_or(1).max(1),
        );

        for worker in 0..fan_out {
            let source = Arc::clone(&self.source);
            let query = run.query.clone();
            let tx = tx.clone();
            let offset = base + u64::from(worker) * u64::from(self.config.page_size);
            let limit = self.config.page_size;
            tokio::spawn(async move {
                let cursor = offset_to_cursor(offset);
                let result = source.search(&query, cursor.as_deref(), limit).await;
                // The barrier may have moved on without us.
                let _ = tx.send((worker, result)).await;
            });
        }
        drop(tx);

        let mut fetch = RoundFetch {
            items: Vec::new(),
            oldest: None,
            reported: 0,
            failed: 0,
            timed_out: false,
        };
        let mut dropped_timestamps = 0usize;

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((_, Ok(page)))) => {
                    fetch.reported += 1;
                    if let Some(page_oldest) = page.oldest_created_at() {
                        fetch.oldest = Some(match fetch.oldest {
                            Some(oldest) => oldest.min(page_oldest),
                            None => page_oldest,
                        });
                    }
                    for post in page.posts {
                        match post_to_item(post) {
                            Some(item) => fetch.items.push(item),
                            None => dropped_timestamps += 1,
                        }
                    }
                }
                Ok(Some((worker, Err(error)))) => {
                    fetch.reported += 1;
                    fetch.failed += 1;
                    tracing::warn!(
                        run_id = %run.run_id,
                        worker,
                        error = %error,
                        "search worker failed — using empty page"
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    fetch.timed_out = true;
                    tracing::warn!(
                        run_id = %run.run_id,
                        reported = fetch.reported,
                        fan_out,
                        "round deadline hit — using partial results"
                    );
                    break;
                }
            }
        }

        if dropped_timestamps > 0 {
            tracing::debug!(
                run_id = %run.run_id,
                dropped = dropped_timestamps,
                "dropped posts with unparseable timestamps"
            );
        }

        fetch
    }
}

/// A post without a parseable timestamp cannot take part in boundary or
/// window decisions, so it is dropped here rather than carried as garbage.
fn post_to_item(post: FeedPost) -> Option<Item> {
    let created_at = post.created_at?;
    Some(Item {
        external_id: post.uri,
        content_id: post.cid,
        author_handle: post.author_handle,
        text: post.text,
        created_at,
        like_count: post.like_count,
        repost_count: post.repost_count,
        reply_count: post.reply_count,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use moodwire_store::{MemoryRunStore, RunStatus};

    use super::*;

    fn post(id: &str, created_at: DateTime<Utc>, likes: i32) -> FeedPost {
        FeedPost {
            uri: format!("at://did:plc:test/app.bsky.feed.post/{id}"),
            cid: format!("bafy{id}"),
            author_handle: format!("{id}.example"),
            text: "hello".to_owned(),
            created_at: Some(created_at),
            like_count: likes,
            repost_count: 0,
            reply_count: 0,
        }
    }

    /// Deterministic source: pages keyed by result offset, optional
    /// per-offset failures, and an optional "fail the first N calls" fuse
    /// for round-retry tests.
    struct ScriptedSource {
        pages: HashMap<u64, Vec<FeedPost>>,
        failing_offsets: HashSet<u64>,
        fail_first_calls: AtomicU32,
        calls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(pages: HashMap<u64, Vec<FeedPost>>) -> Self {
            Self {
                pages,
                failing_offsets: HashSet::new(),
                fail_first_calls: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchSource for ScriptedSource {
        async fn search(
            &self,
            _query: &str,
            cursor: Option<&str>,
            limit: u32,
        ) -> Result<SearchPage, FeedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let offset = cursor
                .filter(|c| !c.is_empty())
                .map_or(0, |c| c.parse::<u64>().expect("test cursor is decimal"));

            if self
                .fail_first_calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(FeedError::Api {
                    status: 500,
                    message: "scripted outage".to_owned(),
                });
            }
            if self.failing_offsets.contains(&offset) {
                return Err(FeedError::CursorRejected("scripted deep-offset reject".to_owned()));
            }

            let posts = self.pages.get(&offset).cloned().unwrap_or_default();
            let cursor = if posts.is_empty() {
                None
            } else {
                Some((offset + u64::from(limit)).to_string())
            };
            Ok(SearchPage { posts, cursor })
        }
    }

    fn config(fan_out: u32, page_size: u32, max_rounds: u32) -> CollectorConfig {
        CollectorConfig {
            page_size,
            fan_out,
            max_rounds,
            round_timeout: Duration::from_secs(5),
            collect_budget: Duration::from_secs(30),
            round_retry_backoff: Duration::ZERO,
        }
    }

    /// Round 2 contains one worker whose page dips past the window start;
    /// collection stops after that round but keeps every item it fetched.
    #[tokio::test]
    async fn boundary_stop_retains_the_whole_round() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);
        let before_window = run.window_start - ChronoDuration::minutes(5);

        let mut pages = HashMap::new();
        // Round 1: offsets 0 and 3, all in-window.
        pages.insert(0, vec![post("a", in_window, 1), post("b", in_window, 2)]);
        pages.insert(3, vec![post("c", in_window, 3)]);
        // Round 2: offset 6 in-window, offset 9 crosses the boundary.
        pages.insert(6, vec![post("d", in_window, 4)]);
        pages.insert(9, vec![post("e", in_window, 5), post("old", before_window, 6)]);

        let source = Arc::new(ScriptedSource::new(pages));
        let collector = Collector::new(Arc::clone(&source), config(2, 3, 25));

        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::BoundaryCrossed);

        let run = store.get_run(run.run_id).await.unwrap();
        assert!(!run.has_more);
        assert_eq!(run.rounds_completed, 2);
        assert_eq!(run.status, RunStatus::Running, "terminal status is the coordinator's call");

        let items = store.list_items(run.run_id).await.unwrap();
        assert_eq!(items.len(), 6, "the boundary-crossing round's items are retained");
        assert!(items.iter().any(|i| i.external_id.ends_with("/old")));
    }

    #[tokio::test]
    async fn cursor_advances_by_fan_out_times_page_size() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        let mut pages = HashMap::new();
        pages.insert(0, vec![post("a", in_window, 1)]);
        pages.insert(3, vec![post("b", in_window, 1)]);
        // Round 2 finds nothing and stops; cursor still moved forward.

        let source = Arc::new(ScriptedSource::new(pages));
        let collector = Collector::new(source, config(2, 3, 25));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::ResultSetExhausted);

        let run = store.get_run(run.run_id).await.unwrap();
        assert_eq!(run.cursor, "12", "two rounds × (2 workers × 3 per page)");
        assert_eq!(run.rounds_completed, 2);
    }

    #[tokio::test]
    async fn failed_worker_contributes_an_empty_page() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        let mut pages = HashMap::new();
        pages.insert(0, vec![post("a", in_window, 1), post("b", in_window, 2)]);
        // Offset 3 rejects — the known deep-offset behavior.
        let mut source = ScriptedSource::new(pages);
        source.failing_offsets.insert(3);
        let source = Arc::new(source);

        let collector = Collector::new(Arc::clone(&source), config(2, 3, 25));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        // Round 1 keeps offset 0's items; round 2 is empty and stops.
        assert_eq!(reason, StopReason::ResultSetExhausted);

        let items = store.list_items(run.run_id).await.unwrap();
        assert_eq!(items.len(), 2, "the failing worker must not sink the round");
    }

    #[tokio::test]
    async fn fully_failed_round_is_retried_once_then_continues() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        let mut pages = HashMap::new();
        pages.insert(0, vec![post("a", in_window, 1)]);
        pages.insert(3, vec![post("b", in_window, 2)]);
        let source = ScriptedSource::new(pages);
        // Exactly the first round's worth of calls fails.
        source.fail_first_calls.store(2, Ordering::SeqCst);
        let source = Arc::new(source);

        let collector = Collector::new(Arc::clone(&source), config(2, 3, 25));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::ResultSetExhausted);

        let items = store.list_items(run.run_id).await.unwrap();
        assert_eq!(items.len(), 2, "retry should have recovered the round");
        // 2 failed + 2 retried + 2 for the final empty round.
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test]
    async fn round_failing_twice_surfaces_collection_failed() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();

        let source = ScriptedSource::new(HashMap::new());
        source.fail_first_calls.store(4, Ordering::SeqCst);
        let source = Arc::new(source);

        let collector = Collector::new(source, config(2, 3, 25));
        let err = collector.collect(&store, run.run_id).await.unwrap_err();
        assert!(matches!(err, PipelineError::CollectionFailed(_)));

        // The collector does not own terminal status transitions.
        let run = store.get_run(run.run_id).await.unwrap();
        assert_eq!(run.status, RunStatus::Running);
    }

    #[tokio::test]
    async fn round_limit_is_a_safety_valve() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        // Endless in-window data at every offset the test can reach.
        let mut pages = HashMap::new();
        for round in 0u64..10 {
            for worker in 0u64..2 {
                let offset = round * 6 + worker * 3;
                pages.insert(
                    offset,
                    vec![post(&format!("r{round}w{worker}"), in_window, 1)],
                );
            }
        }

        let source = Arc::new(ScriptedSource::new(pages));
        let collector = Collector::new(source, config(2, 3, 2));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::RoundLimitReached);

        let run = store.get_run(run.run_id).await.unwrap();
        assert_eq!(run.rounds_completed, 2);
        assert!(!run.has_more);
    }

    #[tokio::test]
    async fn empty_first_round_means_exhausted() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();

        let source = Arc::new(ScriptedSource::new(HashMap::new()));
        let collector = Collector::new(source, config(2, 3, 25));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::ResultSetExhausted);

        assert_eq!(store.count_items(run.run_id).await.unwrap(), 0);
        assert!(!store.get_run(run.run_id).await.unwrap().has_more);
    }

    #[tokio::test]
    async fn exhausted_budget_stops_collection() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        let mut pages = HashMap::new();
        pages.insert(0, vec![post("a", in_window, 1)]);
        let source = Arc::new(ScriptedSource::new(pages));

        let mut cfg = config(1, 3, 25);
        cfg.collect_budget = Duration::ZERO;
        let collector = Collector::new(source, cfg);
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::BudgetElapsed);
        assert!(!store.get_run(run.run_id).await.unwrap().has_more);
    }

    #[tokio::test]
    async fn finished_run_is_left_alone() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        store.advance_cursor(run.run_id, "600", false).await.unwrap();

        let source = Arc::new(ScriptedSource::new(HashMap::new()));
        let collector = Collector::new(Arc::clone(&source), config(2, 3, 25));
        let reason = collector.collect(&store, run.run_id).await.unwrap();
        assert_eq!(reason, StopReason::AlreadyComplete);
        assert_eq!(source.calls(), 0, "no fetches against a finished run");
    }

    #[tokio::test]
    async fn collect_step_runs_exactly_one_round() {
        let store = MemoryRunStore::default();
        let run = store.create_run(30, "q", None).await.unwrap();
        let in_window = run.window_start + ChronoDuration::minutes(10);

        let mut pages = HashMap::new();
        pages.insert(0, vec![post("a", in_window, 1)]);
        pages.insert(3, vec![post("b", in_window, 1)]);
        pages.insert(6, vec![post("c", in_window, 1)]);
        pages.insert(9, vec![post("d", in_window, 1)]);

        let source = Arc::new(ScriptedSource::new(pages));
        let collector = Collector::new(source, config(2, 3, 25));

        let first = collector.collect_step(&store, run.run_id).await.unwrap();
        assert_eq!(first, None, "round 1 found data and wants to continue");
        assert_eq!(store.get_run(run.run_id).await.unwrap().rounds_completed, 1);

        let second = collector.collect_step(&store, run.run_id).await.unwrap();
        assert_eq!(second, None);

        let third = collector.collect_step(&store, run.run_id).await.unwrap();
        assert_eq!(third, Some(StopReason::ResultSetExhausted));

        let after = collector.collect_step(&store, run.run_id).await.unwrap();
        assert_eq!(after, Some(StopReason::AlreadyComplete));
    }
}
