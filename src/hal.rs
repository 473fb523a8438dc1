use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bus::peripheral::BusPeripheral;
use crate::bus::transport::BusTransport;
use crate::config::{HalConfig, TimingConfig};
use crate::errors::{HalError, HalResult};
use crate::events::{event_channel, EventBridge};
use crate::header::ReadPlan;
use crate::registry::{RxHandler, UnitId, UnitLines, UnitRegistry};
use crate::sequencer::reset_unit;
use crate::stats::{HalCounters, HalStats};
use crate::worker::Worker;

/// Entry points used by the sensor-hub protocol layer.
///
/// Every unit-taking call validates the unit before touching the bus lock.
/// None of the waits are bounded unless `timing.transfer_timeout_ms` is set:
/// a wedged peripheral or a lost completion stalls the caller (and, for
/// reads, the worker) indefinitely.
pub struct SensorHubHal {
    transport: Arc<BusTransport>,
    registry: Arc<UnitRegistry>,
    bridge: EventBridge,
    timing: TimingConfig,
    max_transfer: usize,
    counters: Arc<HalCounters>,
    worker: JoinHandle<()>,
}

impl SensorHubHal {
    /// One-time setup: bus lock, units (held in reset), event queue, worker task.
    ///
    /// Must run inside a tokio runtime. `lines` is matched to units by
    /// index; units past its end get unwired lines.
    pub fn init(
        config: &HalConfig,
        peripheral: Box<dyn BusPeripheral>,
        lines: Vec<UnitLines>,
    ) -> HalResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| HalError::Runtime)?;

        let counters = Arc::new(HalCounters::default());
        let registry = Arc::new(UnitRegistry::new(config.unit_addresses(), lines));
        let transport = Arc::new(BusTransport::new(
            peripheral,
            config.transport.clone(),
            registry.len(),
            config.timing.transfer_timeout(),
            counters.clone(),
        ));
        let (bridge, events) = event_channel(config.events.queue_capacity, counters.clone());

        let plan = ReadPlan {
            header_len: config.hal.header_len,
            max_transfer: config.hal.max_transfer,
        };
        let worker = Worker::new(events, transport.clone(), registry.clone(), plan, counters.clone());
        let worker = runtime.spawn(worker.run());

        info!(
            "[hal] initialized {} unit(s), queue depth {}, max transfer {}",
            registry.len(),
            config.events.queue_capacity,
            config.hal.max_transfer
        );

        Ok(Self {
            transport,
            registry,
            bridge,
            timing: config.timing.clone(),
            max_transfer: config.hal.max_transfer,
            counters,
            worker,
        })
    }

    /// Reset `unit` into normal or DFU mode and register its chunk handler
    pub async fn reset(
        &self,
        unit: usize,
        dfu_mode: bool,
        handler: Option<Arc<dyn RxHandler>>,
    ) -> HalResult<()> {
        let id = self.registry.check(unit)?;
        reset_unit(
            &self.transport,
            self.registry.get(id),
            dfu_mode,
            handler,
            &self.timing,
        )
        .await;
        Ok(())
    }

    /// Blocking write of `data` to the unit
    pub async fn send(&self, unit: usize, data: &[u8]) -> HalResult<()> {
        let Some(id) = self.checked_transfer(unit, data.len())? else {
            return Ok(());
        };
        self.transport.send(id, data).await
    }

    /// Blocking read filling all of `buf` from the unit
    pub async fn receive(&self, unit: usize, buf: &mut [u8]) -> HalResult<()> {
        let Some(id) = self.checked_transfer(unit, buf.len())? else {
            return Ok(());
        };
        self.transport.receive(id, buf).await
    }

    /// Suspend until another caller runs [`unblock`](Self::unblock) for this unit
    pub async fn block(&self, unit: usize) -> HalResult<()> {
        let id = self.registry.check(unit)?;
        self.registry.get(id).gate().block().await;
        Ok(())
    }

    pub fn unblock(&self, unit: usize) -> HalResult<()> {
        let id = self.registry.check(unit)?;
        self.registry.get(id).gate().unblock();
        Ok(())
    }

    /// Producer handle for the data-ready interrupt path
    pub fn event_bridge(&self) -> EventBridge {
        self.bridge.clone()
    }

    pub fn unit_count(&self) -> usize {
        self.registry.len()
    }

    pub fn stats(&self) -> HalStats {
        self.counters.snapshot()
    }

    /// `None` for an empty transfer, which succeeds without touching the bus
    fn checked_transfer(&self, unit: usize, len: usize) -> HalResult<Option<UnitId>> {
        let id = self.registry.check(unit)?;
        if len == 0 {
            debug!("[hal] zero-length transfer for unit {} skipped", unit);
            return Ok(None);
        }
        if len > self.max_transfer {
            return Err(HalError::TransferTooLarge {
                len,
                max: self.max_transfer,
            });
        }
        Ok(Some(id))
    }
}

impl Drop for SensorHubHal {
    fn drop(&mut self) {
        self.worker.abort();
    }
}
