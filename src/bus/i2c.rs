#[cfg(target_os = "linux")]
use i2cdev::core::I2CDevice;
#[cfg(target_os = "linux")]
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};
#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(target_os = "linux")]
use std::sync::{Arc, Mutex};
#[cfg(target_os = "linux")]
use tracing::{debug, info, warn};

use super::peripheral::BusPeripheral;
#[cfg(target_os = "linux")]
use crate::config::AddressingMode;
use crate::config::TransportConfig;
use crate::sync::CompletionSignal;

/// I2C bus error type - platform specific
#[cfg(target_os = "linux")]
pub type I2CError = LinuxI2CError;

#[cfg(not(target_os = "linux"))]
#[derive(Debug)]
pub struct I2CError(String);

#[cfg(not(target_os = "linux"))]
impl std::fmt::Display for I2CError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "I2C not supported on this platform: {}", self.0)
    }
}

#[cfg(not(target_os = "linux"))]
impl std::error::Error for I2CError {}

/// I2C bus backed by a `/dev/i2c-N` node.
///
/// The kernel transfer runs on a blocking thread and fires the completion
/// signal from there, standing in for the controller's completion interrupt.
#[cfg(target_os = "linux")]
pub struct I2CBus {
    path: String,
    device: Option<Arc<Mutex<LinuxI2CDevice>>>,
    /// Bumped by `abort`; a transfer thread only touches the device if its
    /// generation is still current once it holds the device lock
    generation: Arc<AtomicU64>,
}

#[cfg(not(target_os = "linux"))]
pub struct I2CBus {
    _phantom: std::marker::PhantomData<()>,
}

#[cfg(target_os = "linux")]
impl I2CBus {
    /// Checks that the node can be opened. The descriptor is reopened on the
    /// transport's first reinitialization.
    pub fn new(path: &str) -> Result<Self, I2CError> {
        LinuxI2CDevice::new(path, 0)?;
        Ok(Self {
            path: path.to_string(),
            device: None,
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn transfer(&self) -> Result<Transfer, String> {
        let device = self
            .device
            .clone()
            .ok_or_else(|| format!("{} is not initialized", self.path))?;
        Ok(Transfer {
            device,
            generation: self.generation.clone(),
            issued: self.generation.load(Ordering::SeqCst),
        })
    }
}

/// Device access for one transfer thread
#[cfg(target_os = "linux")]
struct Transfer {
    device: Arc<Mutex<LinuxI2CDevice>>,
    generation: Arc<AtomicU64>,
    issued: u64,
}

#[cfg(target_os = "linux")]
impl Transfer {
    fn run<T>(
        &self,
        address: u16,
        f: impl FnOnce(&mut LinuxI2CDevice) -> Result<T, LinuxI2CError>,
    ) -> Result<T, String> {
        let mut dev = self
            .device
            .lock()
            .map_err(|_| "device lock poisoned".to_string())?;
        if self.generation.load(Ordering::SeqCst) != self.issued {
            return Err("transfer aborted".to_string());
        }
        dev.set_slave_address(address).map_err(|e| e.to_string())?;
        f(&mut *dev).map_err(|e| e.to_string())
    }
}

#[cfg(target_os = "linux")]
impl BusPeripheral for I2CBus {
    fn deinit(&mut self) {
        if self.device.take().is_some() {
            debug!("[i2c] closed {}", self.path);
        }
    }

    fn abort(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        // A kernel transfer cannot be interrupted; it is bounded by the
        // adapter timeout. Holding the device lock waits it out, and any
        // thread that has not started yet sees the new generation.
        if let Some(device) = &self.device {
            if device.lock().is_err() {
                warn!("[i2c] {} device lock poisoned during abort", self.path);
            }
        }
        debug!("[i2c] aborted in-flight transfer on {}", self.path);
    }

    fn init(&mut self, config: &TransportConfig) -> Result<(), String> {
        if config.addressing == AddressingMode::TenBit {
            return Err("10-bit addressing is not available through i2c-dev".to_string());
        }
        let device = LinuxI2CDevice::new(&self.path, 0).map_err(|e| e.to_string())?;
        self.device = Some(Arc::new(Mutex::new(device)));
        // Clock rate and duty cycle belong to the kernel adapter driver
        info!(
            "[i2c] opened {} (requested {} Hz, {:?}, {:?})",
            self.path, config.clock_hz, config.addressing, config.duty_cycle
        );
        Ok(())
    }

    fn start_transmit(
        &mut self,
        address: u16,
        data: &[u8],
        done: CompletionSignal,
    ) -> Result<(), String> {
        let transfer = self.transfer()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| e.to_string())?;
        let data = data.to_vec();
        runtime.spawn_blocking(move || match transfer.run(address, |dev| dev.write(&data)) {
            Ok(()) => done.tx_complete(),
            Err(e) => done.error(e),
        });
        Ok(())
    }

    fn start_receive(
        &mut self,
        address: u16,
        len: usize,
        done: CompletionSignal,
    ) -> Result<(), String> {
        let transfer = self.transfer()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| e.to_string())?;
        runtime.spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            match transfer.run(address, |dev| dev.read(&mut buf)) {
                Ok(()) => done.rx_complete(buf),
                Err(e) => done.error(e),
            }
        });
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl I2CBus {
    pub fn new(_path: &str) -> Result<Self, I2CError> {
        Err(I2CError("I2C is only supported on Linux".to_string()))
    }

    pub fn path(&self) -> &str {
        ""
    }
}

#[cfg(not(target_os = "linux"))]
impl BusPeripheral for I2CBus {
    fn deinit(&mut self) {}

    fn abort(&mut self) {}

    fn init(&mut self, _config: &TransportConfig) -> Result<(), String> {
        Err("I2C is only supported on Linux".to_string())
    }

    fn start_transmit(
        &mut self,
        _address: u16,
        _data: &[u8],
        _done: CompletionSignal,
    ) -> Result<(), String> {
        Err("I2C is only supported on Linux".to_string())
    }

    fn start_receive(
        &mut self,
        _address: u16,
        _len: usize,
        _done: CompletionSignal,
    ) -> Result<(), String> {
        Err("I2C is only supported on Linux".to_string())
    }
}
