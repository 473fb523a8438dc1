use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the bridge, transport and worker
#[derive(Debug, Default)]
pub struct HalCounters {
    events_dropped: AtomicU64,
    transfers_rejected: AtomicU64,
    transfers_failed: AtomicU64,
    reinits: AtomicU64,
    chunks_delivered: AtomicU64,
}

impl HalCounters {
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_rejected(&self) {
        self.transfers_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn transfer_failed(&self) {
        self.transfers_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reinitialized(&self) {
        self.reinits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn chunk_delivered(&self) {
        self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HalStats {
        HalStats {
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            transfers_rejected: self.transfers_rejected.load(Ordering::Relaxed),
            transfers_failed: self.transfers_failed.load(Ordering::Relaxed),
            reinits: self.reinits.load(Ordering::Relaxed),
            chunks_delivered: self.chunks_delivered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the HAL counters
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HalStats {
    /// Data-ready events lost because the queue was full
    pub events_dropped: u64,
    /// Transfers the peripheral refused to start
    pub transfers_rejected: u64,
    /// Transfers that completed with an error, timed out or were abandoned
    pub transfers_failed: u64,
    /// Peripheral deinit/init cycles
    pub reinits: u64,
    pub chunks_delivered: u64,
}

impl HalStats {
    /// Serialize to JSON for debugging
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
