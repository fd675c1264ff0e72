use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::hub::ClientHub;
use crate::scheduler::SyncScheduler;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: Config,
    pub hub: Arc<ClientHub>,
    pub scheduler: SyncScheduler,
}

impl AppState {
    /// Ask the host loop for a sync run with the configured tag.
    pub fn request_sync(&self) {
        if !self.scheduler.register(self.config.sync_tag.clone()) {
            tracing::warn!("Sync scheduler is not running; sync request dropped");
        }
    }
}
