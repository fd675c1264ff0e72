use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::sync::{GateOutcome, SyncGate, SyncSignal};

const SIGNAL_QUEUE_CAPACITY: usize = 16;

/// When to fire a signal again after a failed run.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Total runs per signal, the first one included.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(15 * 60),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay after the given failed attempt: `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

/// Handle for firing trigger signals at the scheduler loop.
#[derive(Clone)]
pub struct SyncScheduler {
    sender: mpsc::Sender<SyncSignal>,
}

impl SyncScheduler {
    /// Queue a signal. Returns false once the scheduler has stopped.
    ///
    /// When the queue is full the signal is dropped: a run is already due and will pick up
    /// whatever is pending by then.
    pub fn register(&self, tag: impl Into<String>) -> bool {
        match self.sender.try_send(SyncSignal::new(tag)) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

struct PendingRetry {
    signal: SyncSignal,
    attempt: u32,
    at: Instant,
}

enum Fired {
    Ignored,
    Done,
    Retry(PendingRetry),
}

/// Start the scheduler loop. Runs go through `gate` one at a time, never overlapping.
pub fn spawn(
    gate: Arc<SyncGate>,
    policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
) -> (SyncScheduler, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(SIGNAL_QUEUE_CAPACITY);
    let handle = tokio::spawn(run(gate, policy, receiver, shutdown));
    (SyncScheduler { sender }, handle)
}

async fn run(
    gate: Arc<SyncGate>,
    policy: RetryPolicy,
    mut signals: mpsc::Receiver<SyncSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::debug!("Sync scheduler started");

    let mut retry: Option<PendingRetry> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let retry_at = retry.as_ref().map(|r| r.at);

        tokio::select! {
            signal = signals.recv() => {
                let Some(signal) = signal else { break };
                match fire(&gate, &policy, signal, 1).await {
                    Fired::Ignored => {}
                    Fired::Done => retry = None,
                    Fired::Retry(next) => retry = Some(next),
                }
            }
            _ = tokio::time::sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                if let Some(PendingRetry { signal, attempt, .. }) = retry.take() {
                    if let Fired::Retry(next) = fire(&gate, &policy, signal, attempt).await {
                        retry = Some(next);
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!("Sync scheduler stopped");
}

async fn fire(gate: &SyncGate, policy: &RetryPolicy, signal: SyncSignal, attempt: u32) -> Fired {
    match gate.handle(&signal).await {
        Ok(GateOutcome::Ignored) => {
            tracing::debug!("Ignoring sync signal with tag {}", signal.tag);
            Fired::Ignored
        }
        Ok(GateOutcome::Completed(_)) => Fired::Done,
        Err(e) if attempt < policy.max_attempts => {
            let delay = policy.delay_after(attempt);
            tracing::warn!(
                "Sync run failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                policy.max_attempts
            );
            Fired::Retry(PendingRetry {
                signal,
                attempt: attempt + 1,
                at: Instant::now() + delay,
            })
        }
        Err(e) => {
            tracing::error!("Sync run failed after {attempt} attempts, giving up until next signal: {e}");
            Fired::Done
        }
    }
}
