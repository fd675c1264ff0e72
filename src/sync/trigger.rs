use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{QueueProcessor, RunReport, SyncError};

pub const DEFAULT_SYNC_TAG: &str = "sync-bookmarks";

/// A "conditions allow syncing now" signal from the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSignal {
    pub tag: String,
}

impl SyncSignal {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The signal carried some other tag.
    Ignored,
    Completed(RunReport),
}

/// Entry point for trigger signals. Runs the processor for its own tag only.
pub struct SyncGate {
    tag: String,
    processor: Arc<QueueProcessor>,
}

impl SyncGate {
    pub fn new(tag: impl Into<String>, processor: Arc<QueueProcessor>) -> Self {
        Self {
            tag: tag.into(),
            processor,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Errors are passed through untouched so the host knows to fire again later.
    pub async fn handle(&self, signal: &SyncSignal) -> Result<GateOutcome, SyncError> {
        tracing::info!("Sync event received: {}", signal.tag);

        if signal.tag != self.tag {
            return Ok(GateOutcome::Ignored);
        }

        let report = self.processor.run().await?;
        Ok(GateOutcome::Completed(report))
    }
}
