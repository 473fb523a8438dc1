use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use super::peripheral::BusPeripheral;
use crate::config::TransportConfig;
use crate::errors::{HalError, HalResult};
use crate::registry::UnitId;
use crate::stats::HalCounters;
use crate::sync::{GateError, ResultGate, TransferOutcome};

/// Everything the bus lock protects
pub struct BusState {
    peripheral: Box<dyn BusPeripheral>,
    reinit_needed: bool,
    addresses: Vec<Option<u16>>,
}

impl BusState {
    /// Current bus address of a unit; `None` until its first reset
    pub fn address(&self, unit: UnitId) -> Option<u16> {
        self.addresses[unit.index()]
    }

    pub(crate) fn set_address(&mut self, unit: UnitId, address: u16) {
        self.addresses[unit.index()] = Some(address);
    }

    /// Force a peripheral deinit/init before the next transaction
    pub(crate) fn request_reinit(&mut self) {
        self.reinit_needed = true;
    }
}

pub type BusGuard<'a> = MutexGuard<'a, BusState>;

enum Transfer<'a> {
    Transmit(&'a [u8]),
    Receive(usize),
}

/// Blocking single-transaction access to the shared bus
pub struct BusTransport {
    bus: Mutex<BusState>,
    config: TransportConfig,
    timeout: Option<Duration>,
    counters: Arc<HalCounters>,
}

impl BusTransport {
    /// The peripheral starts out flagged for initialization
    pub fn new(
        peripheral: Box<dyn BusPeripheral>,
        config: TransportConfig,
        unit_count: usize,
        timeout: Option<Duration>,
        counters: Arc<HalCounters>,
    ) -> Self {
        Self {
            bus: Mutex::new(BusState {
                peripheral,
                reinit_needed: true,
                addresses: vec![None; unit_count],
            }),
            config,
            timeout,
            counters,
        }
    }

    /// Take the bus lock, waiting as long as it takes
    pub async fn lock(&self) -> BusGuard<'_> {
        self.bus.lock().await
    }

    pub async fn send(&self, unit: UnitId, data: &[u8]) -> HalResult<()> {
        self.transact(unit, Transfer::Transmit(data)).await.map(|_| ())
    }

    /// Fill `buf` completely from the unit
    pub async fn receive(&self, unit: UnitId, buf: &mut [u8]) -> HalResult<()> {
        let len = buf.len();
        let (address, outcome) = self.transact(unit, Transfer::Receive(len)).await?;
        match outcome {
            TransferOutcome::Received(data) if data.len() == len => {
                buf.copy_from_slice(&data);
                Ok(())
            }
            TransferOutcome::Received(data) => {
                self.counters.transfer_failed();
                Err(HalError::Io {
                    address,
                    reason: format!("short read: wanted {} bytes, got {}", len, data.len()),
                })
            }
            other => {
                self.counters.transfer_failed();
                Err(HalError::Io {
                    address,
                    reason: format!("unexpected completion for receive: {:?}", other),
                })
            }
        }
    }

    async fn transact(&self, unit: UnitId, transfer: Transfer<'_>) -> HalResult<(u16, TransferOutcome)> {
        let mut bus = self.bus.lock().await;

        let address = bus
            .address(unit)
            .ok_or(HalError::Unconfigured { unit: unit.index() })?;

        if bus.reinit_needed {
            self.reinitialize(&mut bus, address)?;
        }

        let (signal, gate) = ResultGate::new();
        let started = match transfer {
            Transfer::Transmit(data) => {
                trace!("[transport] tx {} bytes to {:#04x}", data.len(), address);
                bus.peripheral.start_transmit(address, data, signal)
            }
            Transfer::Receive(len) => {
                trace!("[transport] rx {} bytes from {:#04x}", len, address);
                bus.peripheral.start_receive(address, len, signal)
            }
        };
        if let Err(reason) = started {
            self.counters.transfer_rejected();
            warn!("[transport] {:#04x} rejected: {}", address, reason);
            return Err(HalError::Rejected { address, reason });
        }

        match gate.wait(self.timeout).await {
            Ok(TransferOutcome::Failed(reason)) => {
                self.counters.transfer_failed();
                debug!("[transport] {:#04x} failed: {}", address, reason);
                Err(HalError::Io { address, reason })
            }
            Ok(outcome) => Ok((address, outcome)),
            Err(GateError::Abandoned) => {
                self.counters.transfer_failed();
                bus.peripheral.abort();
                bus.request_reinit();
                warn!("[transport] {:#04x} completion never signalled", address);
                Err(HalError::Io {
                    address,
                    reason: "completion signal dropped".to_string(),
                })
            }
            Err(GateError::TimedOut) => {
                self.counters.transfer_failed();
                // Stop the stale transfer before anyone else gets the bus
                bus.peripheral.abort();
                bus.request_reinit();
                let timeout_ms = self.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                warn!("[transport] {:#04x} timed out after {}ms", address, timeout_ms);
                Err(HalError::Timeout { address, timeout_ms })
            }
        }
    }

    /// Deinit then init the peripheral. Safe to run whether or not anything went wrong.
    fn reinitialize(&self, bus: &mut BusState, address: u16) -> HalResult<()> {
        bus.peripheral.deinit();
        if let Err(reason) = bus.peripheral.init(&self.config) {
            self.counters.transfer_failed();
            warn!("[transport] peripheral init failed: {}", reason);
            return Err(HalError::Io { address, reason });
        }
        bus.reinit_needed = false;
        self.counters.reinitialized();
        debug!("[transport] peripheral reinitialized at {} Hz", self.config.clock_hz);
        Ok(())
    }
}
