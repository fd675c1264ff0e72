//! The queue-and-retry delivery engine.
//!
//! [`trigger::SyncGate`] receives a trigger signal and hands it to
//! [`processor::QueueProcessor`], which drains pending items from the store using a token
//! from a [`credentials::CredentialSource`], a [`delivery::Deliverer`] per item, and reports
//! outcomes through a [`notifier::Notifier`].

pub mod credentials;
pub mod delivery;
pub mod notifier;
pub mod processor;
pub mod trigger;

use thiserror::Error;

pub use credentials::{ClientCredentials, CredentialSource};
pub use delivery::{Deliverer, RaindropClient, RemoteRecord};
pub use notifier::{Notifier, SyncEvent};
pub use processor::{MAX_RETRIES, QueueProcessor, RunReport};
pub use trigger::{GateOutcome, SyncGate, SyncSignal};

/// Failure to obtain a token from a front-end.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("No front-end available for token request")]
    NoClientAvailable,
    #[error("Token request timeout")]
    TokenTimeout,
    #[error("Front-end disconnected before answering the token request")]
    ClientDisconnected,
}

/// Outcome of a single failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Sync failed: {0}")]
    Status(u16),
    #[error("Sync failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DeliveryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Unauthorized => Some(401),
            DeliveryError::Status(code) => Some(*code),
            DeliveryError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Why a run did not deliver everything it picked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncompleteCause {
    /// No usable token; no item was attempted.
    Credentials(Option<CredentialError>),
    ItemsFailed { failed: usize, attempted: usize },
}

impl std::fmt::Display for IncompleteCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncompleteCause::Credentials(Some(e)) => write!(f, "no access token ({e})"),
            IncompleteCause::Credentials(None) => write!(f, "no access token"),
            IncompleteCause::ItemsFailed { failed, attempted } => {
                write!(f, "{failed} of {attempted} items failed to sync")
            }
        }
    }
}

/// Run-level failure. Either variant tells the host to trigger again later.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
    #[error("Sync incomplete: {cause}")]
    Incomplete { cause: IncompleteCause },
}
