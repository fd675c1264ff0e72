use serde::{Deserialize, Serialize};

use crate::hub::{ClientHub, Outbound};

/// Outcome events pushed to front-ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncEvent {
    SyncSuccess { url: String },
    SyncAuthFailed,
}

/// Fire-and-forget broadcast. Nothing is queued for front-ends that are not connected.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &SyncEvent);
}

impl Notifier for ClientHub {
    fn notify(&self, event: &SyncEvent) {
        for (id, sender) in self.clients() {
            tracing::debug!("Sending {event:?} to front-end {id}");
            let _ = sender.send(Outbound::Event(event.clone()));
        }
    }
}
