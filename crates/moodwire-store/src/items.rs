//! Database operations for the `run_items` append-only log.

use sqlx::PgPool;
use uuid::Uuid;

use crate::types::Item;
use crate::StoreError;

/// Appends a batch of items to a run, atomically.
///
/// Inserts are plain row appends inside one transaction: concurrent callers
/// never touch the same rows, so appends from parallel workers commute and
/// nothing is lost. Duplicate `external_id`s are accepted — identity
/// resolution belongs to the aggregation stage, and keeping duplicates makes
/// re-dispatch of a crashed round harmless.
///
/// # Errors
///
/// Returns [`StoreError::NotFound`] if the run does not exist, or
/// [`StoreError::Sqlx`] if any insert fails (the whole batch rolls back).
pub async fn append_items(pool: &PgPool, run_id: Uuid, items: &[Item]) -> Result<(), StoreError> {
    if items.is_empty() {
        return Ok(());
    }

    let internal_id: i64 = sqlx::query_scalar("SELECT id FROM runs WHERE public_id = $1")
        .bind(run_id)
        .fetch_optional(pool)
        .await?
        .ok_or(StoreError::NotFound)?;

    let mut tx = pool.begin().await?;
    for item in items {
        sqlx::query(
            "INSERT INTO run_items \
                 (run_id, external_id, content_id, author_handle, text, created_at, \
                  like_count, repost_count, reply_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(internal_id)
        .bind(&item.external_id)
        .bind(&item.content_id)
        .bind(&item.author_handle)
        .bind(&item.text)
        .bind(item.created_at)
        .bind(item.like_count)
        .bind(item.repost_count)
        .bind(item.reply_count)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    Ok(())
}

/// Returns all items for a run in first-seen (insertion) order.
///
/// # Errors
///
/// Returns [`StoreError::Sqlx`] if the query fails.
pub async fn list_items(pool: &PgPool, run_id: Uuid) -> Result<Vec<Item>, StoreError> {
    let items = sqlx::query_as::<_, Item>(
        "SELECT ri.external_id, ri.content_id, ri.author_handle, ri.text, ri.created_at, \
                ri.like_count, ri.repost_count, ri.reply_count \
         FROM run_items ri \
         JOIN runs r ON r.id = ri.run_id \
         WHERE r.public_id = $1 \
         ORDER BY ri.id",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await?;

    Ok(items)
}

/// Counts the items stored for a run (duplicates included).
///
/// # Errors
///
/// Returns [`StoreError::Sqlx`] if the query fails.
pub async fn count_items(pool: &PgPool, run_id: Uuid) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM run_items ri \
         JOIN runs r ON r.id = ri.run_id \
         WHERE r.public_id = $1",
    )
    .bind(run_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}
