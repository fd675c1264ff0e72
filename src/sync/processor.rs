use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::{
    CredentialError, CredentialSource, Deliverer, DeliveryError, IncompleteCause, Notifier,
    SyncError, SyncEvent,
};
use crate::db;
use crate::models::{QueueItem, QueueItemUpdate, QueueStatus};

/// Transient failures an item may accumulate before it is marked `failed`.
pub const MAX_RETRIES: i64 = 3;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

const INVALID_TOKEN: &str = "Invalid token";

/// Counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub recovered: u64,
    pub attempted: usize,
    pub delivered: usize,
    pub retrying: usize,
    pub failed: usize,
    /// Items deleted from the queue by someone else while the run had them in hand.
    pub removed: usize,
}

enum ItemOutcome {
    Delivered,
    Retrying,
    Failed,
    Removed,
}

pub struct QueueProcessor {
    pool: SqlitePool,
    credentials: Arc<dyn CredentialSource>,
    deliverer: Arc<dyn Deliverer>,
    notifier: Arc<dyn Notifier>,
    stale_after: Duration,
}

impl QueueProcessor {
    pub fn new(
        pool: SqlitePool,
        credentials: Arc<dyn CredentialSource>,
        deliverer: Arc<dyn Deliverer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            pool,
            credentials,
            deliverer,
            notifier,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    /// How long an item may sit in `syncing` before a run treats it as abandoned.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Drain the pending queue once.
    ///
    /// Returns `Ok` only when every pending item was delivered (or there was nothing to do).
    /// Per-item failures never stop the batch; a missing token or a storage error does.
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        tracing::info!("Processing sync queue");

        let mut report = RunReport {
            recovered: self.recover_stale().await?,
            ..Default::default()
        };

        let items = db::queue::list_by_status(&self.pool, QueueStatus::Pending).await?;
        if items.is_empty() {
            tracing::info!("No pending items to sync");
            return Ok(report);
        }

        tracing::info!("Found {} items to sync", items.len());

        let token = match self.credentials.request_token().await {
            Ok(Some(token)) if !token.is_empty() => token,
            Ok(_) => return Err(self.abort_without_token(None)),
            Err(e) => return Err(self.abort_without_token(Some(e))),
        };

        for item in &items {
            report.attempted += 1;
            match self.process_item(item, &token).await? {
                ItemOutcome::Delivered => report.delivered += 1,
                ItemOutcome::Retrying => report.retrying += 1,
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Removed => report.removed += 1,
            }
        }

        if report.delivered < report.attempted {
            let failed = report.attempted - report.delivered;
            tracing::info!("{failed} items failed, will retry later");
            return Err(SyncError::Incomplete {
                cause: IncompleteCause::ItemsFailed {
                    failed,
                    attempted: report.attempted,
                },
            });
        }

        tracing::info!("All {} items synced successfully", report.delivered);
        Ok(report)
    }

    async fn recover_stale(&self) -> Result<u64, SyncError> {
        let cutoff = chrono::Duration::from_std(self.stale_after)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let recovered = db::queue::requeue_stale(&self.pool, cutoff).await?;
        if recovered > 0 {
            tracing::warn!("Returned {recovered} interrupted items to pending");
        }
        Ok(recovered)
    }

    fn abort_without_token(&self, error: Option<CredentialError>) -> SyncError {
        match &error {
            Some(e) => tracing::error!("No access token available: {e}"),
            None => tracing::error!("No access token available"),
        }
        self.notifier.notify(&SyncEvent::SyncAuthFailed);
        SyncError::Incomplete {
            cause: IncompleteCause::Credentials(error),
        }
    }

    /// A missing row here means the item was deleted mid-run; that skips the item, not the batch.
    async fn process_item(&self, item: &QueueItem, token: &str) -> Result<ItemOutcome, SyncError> {
        match self.sync_item(item, token).await {
            Ok(outcome) => Ok(outcome),
            Err(sqlx::Error::RowNotFound) => {
                tracing::warn!(
                    "Item {} was removed from the queue during the run, skipping",
                    item.id
                );
                Ok(ItemOutcome::Removed)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn sync_item(&self, item: &QueueItem, token: &str) -> Result<ItemOutcome, sqlx::Error> {
        tracing::info!("Syncing item {}: {}", item.id, item.url);

        db::queue::update(
            &self.pool,
            item.id,
            &QueueItemUpdate::status(QueueStatus::Syncing),
        )
        .await?;

        let error = match self.deliverer.deliver(item, Some(token)).await {
            Ok(record) => {
                db::queue::delete(&self.pool, item.id).await?;
                self.notifier.notify(&SyncEvent::SyncSuccess {
                    url: item.url.clone(),
                });
                tracing::info!(
                    "Successfully synced item {} (remote id {:?})",
                    item.id,
                    record.id
                );
                return Ok(ItemOutcome::Delivered);
            }
            Err(e) => e,
        };

        tracing::error!("Failed to sync item {}: {error}", item.id);

        if let DeliveryError::Unauthorized = error {
            db::queue::update(&self.pool, item.id, &QueueItemUpdate::failed(INVALID_TOKEN)).await?;
            self.notifier.notify(&SyncEvent::SyncAuthFailed);
            return Ok(ItemOutcome::Failed);
        }

        let updated = db::queue::record_transient_failure(
            &self.pool,
            item.id,
            MAX_RETRIES,
            &error.to_string(),
        )
        .await?;

        if updated.status == QueueStatus::Failed {
            tracing::warn!("Max retries reached for item {}", item.id);
            Ok(ItemOutcome::Failed)
        } else {
            tracing::info!(
                "Will retry item {} (attempt {}/{MAX_RETRIES})",
                item.id,
                updated.retry_count
            );
            Ok(ItemOutcome::Retrying)
        }
    }
}
