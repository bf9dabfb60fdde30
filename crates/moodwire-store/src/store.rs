//! The [`RunStore`] contract and its Postgres implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::retry::retry_with_backoff;
use crate::types::{Item, Run, RunAggregate};
use crate::{items, runs, StoreError};

/// Retry policy for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn from_app_config(config: &moodwire_core::AppConfig) -> Self {
        Self {
            max_retries: config.store_max_retries,
            backoff_base_ms: config.store_backoff_base_ms,
        }
    }
}

/// Coordination contract between pipeline stages and durable run state.
///
/// Stages exchange state exclusively through this interface — there is no
/// in-memory handoff between a collector round and the aggregation pass, so
/// any stage can be re-dispatched on a different worker. Appends are
/// additive and commutative; cursor advancement and status transitions have
/// a single logical writer at a time.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Create a run whose window ends now and spans `window_minutes` back.
    async fn create_run(
        &self,
        window_minutes: i64,
        query: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Run, StoreError>;

    async fn get_run(&self, run_id: Uuid) -> Result<Run, StoreError>;

    async fn find_run_by_idempotency_key(&self, key: &str) -> Result<Option<Run>, StoreError>;

    /// Append collected items; must never lose earlier appends under
    /// concurrent callers.
    async fn append_items(&self, run_id: Uuid, items: &[Item]) -> Result<(), StoreError>;

    /// Record a round's outcome: next cursor and whether more data may exist.
    async fn advance_cursor(
        &self,
        run_id: Uuid,
        cursor: &str,
        has_more: bool,
    ) -> Result<(), StoreError>;

    async fn mark_completed(&self, run_id: Uuid, aggregate: &RunAggregate)
        -> Result<(), StoreError>;

    async fn mark_failed(&self, run_id: Uuid, reason: &str) -> Result<(), StoreError>;

    /// All items for a run in first-seen order (duplicates included).
    async fn list_items(&self, run_id: Uuid) -> Result<Vec<Item>, StoreError>;

    async fn count_items(&self, run_id: Uuid) -> Result<i64, StoreError>;

    /// Operational inspection only — not on the hot path.
    async fn list_recent_runs(&self, limit: i64) -> Result<Vec<Run>, StoreError>;

    /// TTL enforcement; returns the number of purged runs.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

/// Postgres-backed [`RunStore`].
///
/// Every operation is wrapped in the transient-error retry policy; callers
/// see [`StoreError::Unavailable`] only after the policy is exhausted.
#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
    retention_hours: i64,
    retry: RetryConfig,
}

impl PgRunStore {
    #[must_use]
    pub fn new(pool: PgPool, retention_hours: i64, retry: RetryConfig) -> Self {
        Self {
            pool,
            retention_hours,
            retry,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn create_run(
        &self,
        window_minutes: i64,
        query: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Run, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::create_run(
                &self.pool,
                window_minutes,
                query,
                idempotency_key,
                self.retention_hours,
            )
        })
        .await
    }

    async fn get_run(&self, run_id: Uuid) -> Result<Run, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::get_run(&self.pool, run_id)
        })
        .await
    }

    async fn find_run_by_idempotency_key(&self, key: &str) -> Result<Option<Run>, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::find_run_by_idempotency_key(&self.pool, key)
        })
        .await
    }

    async fn append_items(&self, run_id: Uuid, items: &[Item]) -> Result<(), StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            items::append_items(&self.pool, run_id, items)
        })
        .await
    }

    async fn advance_cursor(
        &self,
        run_id: Uuid,
        cursor: &str,
        has_more: bool,
    ) -> Result<(), StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::advance_cursor(&self.pool, run_id, cursor, has_more)
        })
        .await
    }

    async fn mark_completed(
        &self,
        run_id: Uuid,
        aggregate: &RunAggregate,
    ) -> Result<(), StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::mark_completed(&self.pool, run_id, aggregate)
        })
        .await
    }

    async fn mark_failed(&self, run_id: Uuid, reason: &str) -> Result<(), StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::mark_failed(&self.pool, run_id, reason)
        })
        .await
    }

    async fn list_items(&self, run_id: Uuid) -> Result<Vec<Item>, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            items::list_items(&self.pool, run_id)
        })
        .await
    }

    async fn count_items(&self, run_id: Uuid) -> Result<i64, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            items::count_items(&self.pool, run_id)
        })
        .await
    }

    async fn list_recent_runs(&self, limit: i64) -> Result<Vec<Run>, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::list_recent_runs(&self.pool, limit)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        retry_with_backoff(self.retry.max_retries, self.retry.backoff_base_ms, || {
            runs::purge_expired_runs(&self.pool)
        })
        .await
    }
}
