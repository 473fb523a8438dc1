//! Hand-off primitives used by the HAL.
//!
//! Two separate abstractions live here on purpose:
//! - [`ResultGate`] / [`CompletionSignal`]: one outcome, one producer, one waiter.
//!   Each bus transaction creates a fresh pair.
//! - [`Latch`]: the per-unit block/unblock gate. Releases are latched for the
//!   next blocker but never summed.

use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// What the completion path reported for one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Transmitted,
    Received(Vec<u8>),
    Failed(String),
}

/// Producer half of a transaction's result gate.
///
/// Handed to the peripheral with each started transfer. Firing consumes it,
/// so a transaction can be signalled at most once. Dropping it unfired is
/// seen by the waiter as a failure.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: oneshot::Sender<TransferOutcome>,
}

impl CompletionSignal {
    /// Transmit-complete path
    pub fn tx_complete(self) {
        self.fire(TransferOutcome::Transmitted);
    }

    /// Receive-complete path
    pub fn rx_complete(self, data: Vec<u8>) {
        self.fire(TransferOutcome::Received(data));
    }

    /// Error path
    pub fn error(self, reason: impl Into<String>) {
        self.fire(TransferOutcome::Failed(reason.into()));
    }

    fn fire(self, outcome: TransferOutcome) {
        // The waiter only goes away if it timed out; nothing left to tell it.
        let _ = self.tx.send(outcome);
    }
}

/// Why waiting on a [`ResultGate`] produced no outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The signal was dropped without firing
    Abandoned,
    TimedOut,
}

/// Waiter half of a transaction's result gate
#[derive(Debug)]
pub struct ResultGate {
    rx: oneshot::Receiver<TransferOutcome>,
}

impl ResultGate {
    pub fn new() -> (CompletionSignal, ResultGate) {
        let (tx, rx) = oneshot::channel();
        (CompletionSignal { tx }, ResultGate { rx })
    }

    /// Suspend until the outcome is latched, optionally bounded by `timeout`
    pub async fn wait(self, timeout: Option<Duration>) -> Result<TransferOutcome, GateError> {
        match timeout {
            None => self.rx.await.map_err(|_| GateError::Abandoned),
            Some(limit) => match tokio::time::timeout(limit, self.rx).await {
                Ok(outcome) => outcome.map_err(|_| GateError::Abandoned),
                Err(_) => Err(GateError::TimedOut),
            },
        }
    }
}

/// Binary block/unblock gate
#[derive(Debug, Default)]
pub struct Latch {
    notify: Notify,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until released. Consumes a release latched earlier, if any.
    pub async fn block(&self) {
        self.notify.notified().await;
    }

    /// Wake one blocked caller, or latch a single release for the next one
    pub fn unblock(&self) {
        self.notify.notify_one();
    }
}
