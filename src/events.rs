use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::stats::HalCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Interrupt line asserted: the unit has data to read
    DataReady,
}

/// One captured hardware signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Capture time in milliseconds since HAL init
    pub t_ms: u32,
    pub kind: EventKind,
    pub unit: usize,
}

/// Non-blocking producer side of the event queue.
///
/// Safe to call from any context that must not wait. A full queue drops the
/// event; the interrupt line re-asserts while the unit still has data, so
/// the capacity only has to cover the worst burst between worker wakeups.
#[derive(Clone)]
pub struct EventBridge {
    tx: mpsc::Sender<Event>,
    epoch: Instant,
    counters: Arc<HalCounters>,
}

/// Consumer side, owned by the worker
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event in arrival order; `None` once every bridge is gone
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Create the bounded queue linking interrupt capture to the worker
pub fn event_channel(capacity: usize, counters: Arc<HalCounters>) -> (EventBridge, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    let bridge = EventBridge {
        tx,
        epoch: Instant::now(),
        counters,
    };
    (bridge, EventReceiver { rx })
}

impl EventBridge {
    /// Data-ready handler for single-unit boards
    pub fn signal_data_ready(&self) -> bool {
        self.signal(0, EventKind::DataReady)
    }

    /// Data-ready handler for the interrupt line of `unit`
    pub fn signal_unit(&self, unit: usize) -> bool {
        self.signal(unit, EventKind::DataReady)
    }

    /// Enqueue without blocking. Returns false if the event was lost.
    pub fn signal(&self, unit: usize, kind: EventKind) -> bool {
        let event = Event {
            t_ms: self.now_ms(),
            kind,
            unit,
        };
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(lost)) => {
                self.counters.event_dropped();
                warn!("[bridge] queue full, dropped {:?} for unit {}", lost.kind, lost.unit);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.counters.event_dropped();
                debug!("[bridge] worker gone, event for unit {} discarded", unit);
                false
            }
        }
    }

    /// Milliseconds since the bridge was created, wrapping like a tick counter
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }
}
