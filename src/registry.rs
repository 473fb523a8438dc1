use embedded_hal::digital::{ErrorType, OutputPin};
use std::convert::Infallible;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::UnitAddresses;
use crate::errors::{HalError, HalResult};
use crate::sync::Latch;

/// Receives each chunk the worker reads from a unit.
///
/// `chunk` is only valid for the duration of the call; copy out anything
/// needed afterwards. Closures capturing their own context implement this
/// directly.
pub trait RxHandler: Send + Sync {
    fn on_rx(&self, chunk: &[u8], timestamp_us: u64);
}

impl<F> RxHandler for F
where
    F: Fn(&[u8], u64) + Send + Sync,
{
    fn on_rx(&self, chunk: &[u8], timestamp_us: u64) {
        self(chunk, timestamp_us)
    }
}

/// A digital output driving one of a unit's control pins
pub trait ControlLine: Send {
    fn set_level(&mut self, high: bool);
}

impl<P> ControlLine for P
where
    P: OutputPin + Send,
{
    fn set_level(&mut self, high: bool) {
        let res = if high { self.set_high() } else { self.set_low() };
        if let Err(e) = res {
            warn!("[registry] control line write failed: {:?}", e);
        }
    }
}

/// Stand-in for a pin that is not wired to this host
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLine;

impl ErrorType for NullLine {
    type Error = Infallible;
}

impl OutputPin for NullLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Reset (active low) and boot-mode select (low = DFU) lines of one unit
pub struct UnitLines {
    reset: Box<dyn ControlLine>,
    boot: Box<dyn ControlLine>,
}

impl UnitLines {
    pub fn new(reset: impl ControlLine + 'static, boot: impl ControlLine + 'static) -> Self {
        Self {
            reset: Box::new(reset),
            boot: Box::new(boot),
        }
    }

    pub fn unwired() -> Self {
        Self::new(NullLine, NullLine)
    }

    pub(crate) fn hold_in_reset(&mut self, dfu_mode: bool) {
        self.reset.set_level(false);
        self.boot.set_level(!dfu_mode);
    }

    pub(crate) fn release_reset(&mut self) {
        self.reset.set_level(true);
    }
}

/// Index of a unit that has been checked against the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitId(usize);

impl UnitId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-device state shared between callers and the worker
pub struct Unit {
    id: UnitId,
    addresses: UnitAddresses,
    handler: RwLock<Option<Arc<dyn RxHandler>>>,
    lines: Mutex<UnitLines>,
    gate: Latch,
}

impl Unit {
    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn addresses(&self) -> UnitAddresses {
        self.addresses
    }

    pub fn handler(&self) -> Option<Arc<dyn RxHandler>> {
        self.handler.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn set_handler(&self, handler: Option<Arc<dyn RxHandler>>) {
        *self.handler.write().unwrap_or_else(|e| e.into_inner()) = handler;
    }

    /// Drive the control lines. Callers hold the bus lock.
    pub(crate) fn with_lines<R>(&self, f: impl FnOnce(&mut UnitLines) -> R) -> R {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut lines)
    }

    pub fn gate(&self) -> &Latch {
        &self.gate
    }
}

/// Fixed set of units allocated at init
pub struct UnitRegistry {
    units: Vec<Unit>,
}

impl UnitRegistry {
    /// Every unit starts held in reset with normal boot mode selected.
    /// Units without an entry in `lines` get unwired lines.
    pub fn new(addresses: Vec<UnitAddresses>, lines: Vec<UnitLines>) -> Self {
        let mut lines = lines.into_iter();
        let units: Vec<Unit> = addresses
            .into_iter()
            .enumerate()
            .map(|(index, addresses)| {
                let mut unit_lines = lines.next().unwrap_or_else(UnitLines::unwired);
                unit_lines.hold_in_reset(false);
                Unit {
                    id: UnitId(index),
                    addresses,
                    handler: RwLock::new(None),
                    lines: Mutex::new(unit_lines),
                    gate: Latch::new(),
                }
            })
            .collect();
        debug!("[registry] {} unit(s) held in reset", units.len());
        Self { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Validate a raw unit number
    pub fn check(&self, unit: usize) -> HalResult<UnitId> {
        if unit < self.units.len() {
            Ok(UnitId(unit))
        } else {
            Err(HalError::BadParam {
                unit,
                units: self.units.len(),
            })
        }
    }

    pub fn get(&self, id: UnitId) -> &Unit {
        &self.units[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table() -> Vec<UnitAddresses> {
        vec![
            UnitAddresses { normal: 0x4A, dfu: 0x28 },
            UnitAddresses { normal: 0x4B, dfu: 0x29 },
        ]
    }

    #[derive(Clone, Default)]
    struct LevelLog(Arc<Mutex<Vec<bool>>>);

    impl ErrorType for LevelLog {
        type Error = Infallible;
    }

    impl OutputPin for LevelLog {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.lock().unwrap().push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.lock().unwrap().push(true);
            Ok(())
        }
    }

    #[test]
    fn test_check_rejects_out_of_range() {
        let registry = UnitRegistry::new(table(), Vec::new());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.check(1).unwrap().index(), 1);
        assert!(matches!(
            registry.check(2),
            Err(HalError::BadParam { unit: 2, units: 2 })
        ));
    }

    #[test]
    fn test_units_start_held_in_normal_reset() {
        let reset = LevelLog::default();
        let boot = LevelLog::default();
        let lines = vec![UnitLines::new(reset.clone(), boot.clone())];
        let _registry = UnitRegistry::new(table()[..1].to_vec(), lines);

        assert_eq!(*reset.0.lock().unwrap(), vec![false]);
        assert_eq!(*boot.0.lock().unwrap(), vec![true]);
    }

    #[test]
    fn test_closure_handler_is_invoked() {
        let registry = UnitRegistry::new(table(), Vec::new());
        let unit = registry.get(registry.check(0).unwrap());
        assert!(unit.handler().is_none());

        let seen = Arc::new(AtomicUsize::new(0));
        let sink = seen.clone();
        unit.set_handler(Some(Arc::new(move |chunk: &[u8], _t: u64| {
            sink.fetch_add(chunk.len(), Ordering::SeqCst);
        })));

        unit.handler().unwrap().on_rx(&[1, 2, 3], 0);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}
