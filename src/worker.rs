use std::sync::Arc;
use tracing::{info, trace, warn};

use crate::bus::transport::BusTransport;
use crate::events::{Event, EventKind, EventReceiver};
use crate::header::{LengthField, ReadPlan};
use crate::registry::{UnitId, UnitRegistry};
use crate::stats::HalCounters;

/// Receive buffer and owed-byte count of one unit. Only the worker touches these.
struct RxState {
    buf: Vec<u8>,
    pending: usize,
}

/// Sole consumer of bridged events
pub struct Worker {
    events: EventReceiver,
    transport: Arc<BusTransport>,
    registry: Arc<UnitRegistry>,
    plan: ReadPlan,
    rx: Vec<RxState>,
    counters: Arc<HalCounters>,
}

impl Worker {
    pub fn new(
        events: EventReceiver,
        transport: Arc<BusTransport>,
        registry: Arc<UnitRegistry>,
        plan: ReadPlan,
        counters: Arc<HalCounters>,
    ) -> Self {
        let rx = (0..registry.len())
            .map(|_| RxState {
                buf: vec![0u8; plan.max_transfer],
                pending: 0,
            })
            .collect();
        Self {
            events,
            transport,
            registry,
            plan,
            rx,
            counters,
        }
    }

    /// Handle events one at a time until every bridge is dropped
    pub async fn run(mut self) {
        info!("[worker] started for {} unit(s)", self.registry.len());
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }
        info!("[worker] event queue closed, stopping");
    }

    async fn handle(&mut self, event: Event) {
        let id = match self.registry.check(event.unit) {
            Ok(id) => id,
            Err(_) => {
                trace!("[worker] discarding event for unknown unit {}", event.unit);
                return;
            }
        };

        match event.kind {
            EventKind::DataReady => self.read_chunk(id, event.t_ms).await,
        }
    }

    /// One step of the dynamic-length read protocol
    async fn read_chunk(&mut self, id: UnitId, t_ms: u32) {
        // Nobody to deliver to: skip the bus traffic entirely
        let Some(handler) = self.registry.get(id).handler() else {
            trace!("[worker] unit {} has no handler, event dropped", id.index());
            return;
        };

        let state = &mut self.rx[id.index()];
        let read_len = self.plan.read_len(state.pending);

        if let Err(e) = self.transport.receive(id, &mut state.buf[..read_len]).await {
            warn!("[worker] unit {} read of {} bytes failed: {}", id.index(), read_len, e);
            return;
        }

        let cargo_len = LengthField::parse(&state.buf[..read_len])
            .map(|field| usize::from(field.cargo_len))
            .unwrap_or(0);
        state.pending = self.plan.pending_after(cargo_len, read_len);
        trace!(
            "[worker] unit {} read {} of {} bytes, {} pending",
            id.index(),
            read_len,
            cargo_len,
            state.pending
        );

        handler.on_rx(&state.buf[..read_len], u64::from(t_ms) * 1000);
        self.counters.chunk_delivered();
    }
}
