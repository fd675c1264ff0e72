use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::CredentialError;
use crate::hub::{ClientHub, Outbound};

pub const DEFAULT_TOKEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of a short-lived bearer token. The engine keeps no token of its own.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` means a front-end answered but had no token to give.
    async fn request_token(&self) -> Result<Option<String>, CredentialError>;
}

/// Asks the oldest connected front-end for its token over a one-shot reply channel.
pub struct ClientCredentials {
    hub: Arc<ClientHub>,
    timeout: Duration,
}

impl ClientCredentials {
    pub fn new(hub: Arc<ClientHub>, timeout: Duration) -> Self {
        Self { hub, timeout }
    }
}

#[async_trait]
impl CredentialSource for ClientCredentials {
    async fn request_token(&self) -> Result<Option<String>, CredentialError> {
        let clients = self.hub.clients();
        let Some((client_id, sender)) = clients.into_iter().next() else {
            tracing::warn!("No front-ends available for token request");
            return Err(CredentialError::NoClientAvailable);
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if sender.send(Outbound::TokenRequest(reply_tx)).is_err() {
            tracing::warn!("Front-end {client_id} went away before the token request was sent");
            return Err(CredentialError::NoClientAvailable);
        }

        tracing::debug!("Requested access token from front-end {client_id}");

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(_)) => Err(CredentialError::ClientDisconnected),
            Err(_) => {
                tracing::warn!(
                    "Front-end {client_id} did not answer token request within {:?}",
                    self.timeout
                );
                Err(CredentialError::TokenTimeout)
            }
        }
    }
}
