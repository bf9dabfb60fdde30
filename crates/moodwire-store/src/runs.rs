//! Database operations for the `runs` table.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{Run, RunAggregate, RunStatus};
use crate::StoreError;

const RUN_COLUMNS: &str = "public_id, idempotency_key, query, status, window_start, window_end, \
     cursor, has_more, rounds_completed, item_count, average_compound, mood_label, \
     top_items, failure_reason, created_at, updated_at, expires_at";

/// A row from the `runs` table. Converted into [`Run`] so callers never see
/// the raw status string or the internal serial id.
#[derive(Debug, sqlx::FromRow)]
struct RunRow {
    public_id: Uuid,
    idempotency_key: Option<String>,
    query: String,
    status: String,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    cursor: String,
    has_more: bool,
    rounds_completed: i32,
    item_count: Option<i32>,
    average_compound: Option<f64>,
    mood_label: Option<String>,
    top_items: Option<serde_json::Value>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<RunRow> for Run {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        let status = RunStatus::parse(&row.status).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "run {} has unknown status '{}'",
                row.public_id, row.status
            ))
        })?;
        Ok(Run {
            run_id: row.public_id,
            idempotency_key: row.idempotency_key,
            query: row.query,
            status,
            window_start: row.window_start,
            window_end: row.window_end,
            cursor: row.cursor,
            has_more: row.has_more,
            rounds_completed: row.rounds_completed,
            item_count: row.item_count,
            average_compound: row.average_compound,
            mood_label: row.mood_label,
            top_items: row.top_items,
            failure_reason: row.failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            expires_at: row.expires_at,
        })
    }
}

/// Creates a new run in `running` status over the window ending now.
///
/// The window is computed here, once: `window_end = now`,
/// `window_start = now - window_minutes`. The run id is a UUIDv7 so ids are
/// time-ordered. `expires_at` is set `retention_hours` out regardless of how
/// the run eventually ends.
///
/// # Errors
///
/// Returns [`StoreError::IdempotencyConflict`] if `idempotency_key` is
/// already taken, or [`StoreError::Sqlx`] if the insert fails.
pub async fn create_run(
    pool: &PgPool,
    window_minutes: i64,
    query: &str,
    idempotency_key: Option<&str>,
    retention_hours: i64,
) -> Result<Run, StoreError> {
    let run_id = Uuid::now_v7();
    let window_end = Utc::now();
    let window_start = window_end - Duration::minutes(window_minutes);
    let expires_at = window_end + Duration::hours(retention_hours);

    let result = sqlx::query_as::<_, RunRow>(&format!(
        "INSERT INTO runs (public_id, idempotency_key, query, status, window_start, window_end, expires_at) \
         VALUES ($1, $2, $3, 'running', $4, $5, $6) \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(run_id)
    .bind(idempotency_key)
    .bind(query)
    .bind(window_start)
    .bind(window_end)
    .bind(expires_at)
    .fetch_one(pool)
    .await;

    match result {
        Ok(row) => row.try_into(),
        Err(e) => {
            if let Some(key) = idempotency_key {
                if e.as_database_error().is_some_and(|db| db.is_unique_violation()) {
                    return Err(StoreError::IdempotencyConflict(key.to_owned()));
                }
            }
            Err(e.into())
        }
    }
}

/// Fetches a single run by its public id.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if no run exists with the given id, or
/// [`StoreError::Sqlx`] if the query fails.
pub async fn get_run(pool: &PgPool, run_id: Uuid) -> Result<Run, StoreError> {
    sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE public_id = $1"
    ))
    .bind(run_id)
    .fetch_optional(pool)
    .await?
    .ok_or(StoreError::NotFound)?
    .try_into()
}

/// Looks up a run by its idempotency key.
///
/// # Errors
///
/// Returns [`StoreError::Sqlx`] if the query fails.
pub async fn find_run_by_idempotency_key(
    pool: &PgPool,
    key: &str,
) -> Result<Option<Run>, StoreError> {
    sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs WHERE idempotency_key = $1"
    ))
    .bind(key)
    .fetch_optional(pool)
    .await?
    .map(TryInto::try_into)
    .transpose()
}

/// Records the outcome of one collection round: the cursor for the next
/// round's worker 0 and whether the source may still yield in-window items.
///
/// Last-writer-wins by design — cursor advancement has a single logical
/// writer per round. Also bumps `rounds_completed`, which is how the
/// max-round safety valve survives process restarts.
///
/// # Errors
///
/// Returns [`StoreError::InvalidTransition`] if the run is not `running`, or
/// [`StoreError::Sqlx`] if the update fails.
pub async fn advance_cursor(
    pool: &PgPool,
    run_id: Uuid,
    cursor: &str,
    has_more: bool,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET cursor = $1, has_more = $2, rounds_completed = rounds_completed + 1, \
             updated_at = NOW() \
         WHERE public_id = $3 AND status = 'running'",
    )
    .bind(cursor)
    .bind(has_more)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::InvalidTransition {
            run_id,
            expected: "running",
        });
    }

    Ok(())
}

/// Marks a run `completed` and stores the aggregation result.
///
/// # Errors
///
/// Returns [`StoreError::InvalidTransition`] if the run is not `running`, or
/// [`StoreError::Sqlx`] if the update fails.
pub async fn mark_completed(
    pool: &PgPool,
    run_id: Uuid,
    aggregate: &RunAggregate,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'completed', has_more = FALSE, item_count = $1, \
             average_compound = $2, mood_label = $3, top_items = $4, updated_at = NOW() \
         WHERE public_id = $5 AND status = 'running'",
    )
    .bind(aggregate.item_count)
    .bind(aggregate.average_compound)
    .bind(aggregate.mood_label.as_deref())
    .bind(&aggregate.top_items)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::InvalidTransition {
            run_id,
            expected: "running",
        });
    }

    Ok(())
}

/// Marks a run `failed` with a reason for operator inspection.
///
/// # Errors
///
/// Returns [`StoreError::InvalidTransition`] if the run is not `running`, or
/// [`StoreError::Sqlx`] if the update fails.
pub async fn mark_failed(pool: &PgPool, run_id: Uuid, reason: &str) -> Result<(), StoreError> {
    let result = sqlx::query(
        "UPDATE runs \
         SET status = 'failed', has_more = FALSE, failure_reason = $1, updated_at = NOW() \
         WHERE public_id = $2 AND status = 'running'",
    )
    .bind(reason)
    .bind(run_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::InvalidTransition {
            run_id,
            expected: "running",
        });
    }

    Ok(())
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`StoreError::Sqlx`] if the query fails.
pub async fn list_recent_runs(pool: &PgPool, limit: i64) -> Result<Vec<Run>, StoreError> {
    sqlx::query_as::<_, RunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(TryInto::try_into)
    .collect()
}

/// Deletes every run whose retention period has lapsed. Items cascade.
///
/// Returns the number of runs removed.
///
/// # Errors
///
/// Returns [`StoreError::Sqlx`] if the delete fails.
pub async fn purge_expired_runs(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM runs WHERE expires_at < NOW()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
