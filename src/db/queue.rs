use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::{QueueItem, QueueItemUpdate, QueueStatus};

/// Insert a new pending item. This is the ingestion boundary; the sync engine never calls it.
pub async fn enqueue(pool: &SqlitePool, url: &str) -> Result<QueueItem, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, QueueItem>(
        "INSERT INTO pending_bookmarks (url, status, retry_count, created_at, updated_at)
         VALUES (?1, 'pending', 0, ?2, ?2) RETURNING *",
    )
    .bind(url)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub async fn list_all(pool: &SqlitePool) -> Result<Vec<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>("SELECT * FROM pending_bookmarks ORDER BY id ASC")
        .fetch_all(pool)
        .await
}

/// Items with the given status in submission order.
pub async fn list_by_status(
    pool: &SqlitePool,
    status: QueueStatus,
) -> Result<Vec<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "SELECT * FROM pending_bookmarks WHERE status = ?1 ORDER BY id ASC",
    )
    .bind(status)
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> Result<Option<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>("SELECT * FROM pending_bookmarks WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Merge `changes` into the stored item. Returns `RowNotFound` if the item is gone.
pub async fn update(
    pool: &SqlitePool,
    id: i64,
    changes: &QueueItemUpdate,
) -> Result<QueueItem, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "UPDATE pending_bookmarks
         SET status = COALESCE(?2, status),
             retry_count = COALESCE(?3, retry_count),
             last_error = COALESCE(?4, last_error),
             updated_at = ?5
         WHERE id = ?1
         RETURNING *",
    )
    .bind(id)
    .bind(changes.status)
    .bind(changes.retry_count)
    .bind(changes.last_error.as_deref())
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or(sqlx::Error::RowNotFound)
}

/// Count a transient failure against the item in one statement.
///
/// The incremented count decides the new status: `failed` (with `error` recorded) once it
/// reaches `max_retries`, `pending` otherwise.
pub async fn record_transient_failure(
    pool: &SqlitePool,
    id: i64,
    max_retries: i64,
    error: &str,
) -> Result<QueueItem, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "UPDATE pending_bookmarks
         SET retry_count = retry_count + 1,
             status = CASE WHEN retry_count + 1 >= ?2 THEN 'failed' ELSE 'pending' END,
             last_error = CASE WHEN retry_count + 1 >= ?2 THEN ?3 ELSE last_error END,
             updated_at = ?4
         WHERE id = ?1
         RETURNING *",
    )
    .bind(id)
    .bind(max_retries)
    .bind(error)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or(sqlx::Error::RowNotFound)
}

/// Returns true if a row was removed.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM pending_bookmarks WHERE id = ?1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Put `syncing` items last touched before `cutoff` back to `pending`.
///
/// A run that was killed mid-delivery leaves its item in `syncing`; without this the item
/// would never match the pending filter again.
pub async fn requeue_stale(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE pending_bookmarks SET status = 'pending', updated_at = ?2
         WHERE status = 'syncing' AND updated_at < ?1",
    )
    .bind(cutoff)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Manually return a `failed` item to `pending`. `retry_count` is kept as is.
pub async fn requeue_failed(pool: &SqlitePool, id: i64) -> Result<Option<QueueItem>, sqlx::Error> {
    sqlx::query_as::<_, QueueItem>(
        "UPDATE pending_bookmarks SET status = 'pending', last_error = NULL, updated_at = ?2
         WHERE id = ?1 AND status = 'failed'
         RETURNING *",
    )
    .bind(id)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await
}

pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(QueueStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (QueueStatus, i64)>(
        "SELECT status, COUNT(*) FROM pending_bookmarks GROUP BY status ORDER BY status",
    )
    .fetch_all(pool)
    .await
}
