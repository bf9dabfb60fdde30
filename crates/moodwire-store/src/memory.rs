//! In-memory [`RunStore`] for unit tests and offline dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::store::RunStore;
use crate::types::{Item, Run, RunAggregate, RunStatus};
use crate::StoreError;

struct StoredRun {
    run: Run,
    items: Vec<Item>,
}

/// `Mutex<HashMap>`-backed store honoring the same contract as Postgres:
/// guarded transitions, append-only items, idempotency-key uniqueness.
pub struct MemoryRunStore {
    retention_hours: i64,
    inner: Mutex<HashMap<Uuid, StoredRun>>,
}

impl MemoryRunStore {
    #[must_use]
    pub fn new(retention_hours: i64) -> Self {
        Self {
            retention_hours,
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRunStore {
    fn default() -> Self {
        Self::new(72)
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create_run(
        &self,
        window_minutes: i64,
        query: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Run, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");

        if let Some(key) = idempotency_key {
            if inner
                .values()
                .any(|s| s.run.idempotency_key.as_deref() == Some(key))
            {
                return Err(StoreError::IdempotencyConflict(key.to_owned()));
            }
        }

        let window_end = Utc::now();
        let run = Run {
            run_id: Uuid::now_v7(),
            idempotency_key: idempotency_key.map(ToOwned::to_owned),
            query: query.to_owned(),
            status: RunStatus::Running,
            window_start: window_end - Duration::minutes(window_minutes),
            window_end,
            cursor: String::new(),
            has_more: true,
            rounds_completed: 0,
            item_count: None,
            average_compound: None,
            mood_label: None,
            top_items: None,
            failure_reason: None,
            created_at: window_end,
            updated_at: window_end,
            expires_at: window_end + Duration::hours(self.retention_hours),
        };
        inner.insert(
            run.run_id,
            StoredRun {
                run: run.clone(),
                items: Vec::new(),
            },
        );
        Ok(run)
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Run, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .get(&run_id)
            .map(|s| s.run.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn find_run_by_idempotency_key(&self, key: &str) -> Result<Option<Run>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        Ok(inner
            .values()
            .find(|s| s.run.idempotency_key.as_deref() == Some(key))
            .map(|s| s.run.clone()))
    }

    async fn append_items(&self, run_id: Uuid, items: &[Item]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let stored = inner.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        stored.items.extend_from_slice(items);
        Ok(())
    }

    async fn advance_cursor(
        &self,
        run_id: Uuid,
        cursor: &str,
        has_more: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let stored = inner.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        if stored.run.status != RunStatus::Running {
            return Err(StoreError::InvalidTransition {
                run_id,
                expected: "running",
            });
        }
        stored.run.cursor = cursor.to_owned();
        stored.run.has_more = has_more;
        stored.run.rounds_completed += 1;
        stored.run.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_completed(
        &self,
        run_id: Uuid,
        aggregate: &RunAggregate,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let stored = inner.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        if stored.run.status != RunStatus::Running {
            return Err(StoreError::InvalidTransition {
                run_id,
                expected: "running",
            });
        }
        stored.run.status = RunStatus::Completed;
        stored.run.has_more = false;
        stored.run.item_count = Some(aggregate.item_count);
        stored.run.average_compound = aggregate.average_compound;
        stored.run.mood_label = aggregate.mood_label.clone();
        stored.run.top_items = Some(aggregate.top_items.clone());
        stored.run.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_failed(&self, run_id: Uuid, reason: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let stored = inner.get_mut(&run_id).ok_or(StoreError::NotFound)?;
        if stored.run.status != RunStatus::Running {
            return Err(StoreError::InvalidTransition {
                run_id,
                expected: "running",
            });
        }
        stored.run.status = RunStatus::Failed;
        stored.run.has_more = false;
        stored.run.failure_reason = Some(reason.to_owned());
        stored.run.updated_at = Utc::now();
        Ok(())
    }

    async fn list_items(&self, run_id: Uuid) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .get(&run_id)
            .map(|s| s.items.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn count_items(&self, run_id: Uuid) -> Result<i64, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        inner
            .get(&run_id)
            .map(|s| i64::try_from(s.items.len()).unwrap_or(i64::MAX))
            .ok_or(StoreError::NotFound)
    }

    async fn list_recent_runs(&self, limit: i64) -> Result<Vec<Run>, StoreError> {
        let inner = self.inner.lock().expect("memory store poisoned");
        let mut runs: Vec<Run> = inner.values().map(|s| s.run.clone()).collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.run_id.cmp(&a.run_id)));
        runs.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(runs)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().expect("memory store poisoned");
        let now = Utc::now();
        let before = inner.len();
        inner.retain(|_, s| s.run.expires_at >= now);
        Ok(u64::try_from(before - inner.len()).unwrap_or_default())
    }
}
