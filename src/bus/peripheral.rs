use crate::config::TransportConfig;
use crate::sync::CompletionSignal;

/// Interrupt-driven bus peripheral as seen by the transport.
///
/// `start_*` calls must not block: they hand the transfer to the hardware and
/// return. Exactly one of the signal's completion paths fires later, from
/// whatever context the hardware completes on. An `Err` return means the
/// transfer was rejected up front and the signal will never fire.
pub trait BusPeripheral: Send {
    fn deinit(&mut self);

    /// Stop the transfer in flight, if any, before returning. Its completion
    /// signal may fire with an error or be dropped. Called with the bus lock
    /// held when a transfer's completion never arrived.
    fn abort(&mut self);

    fn init(&mut self, config: &TransportConfig) -> Result<(), String>;

    fn start_transmit(
        &mut self,
        address: u16,
        data: &[u8],
        done: CompletionSignal,
    ) -> Result<(), String>;

    fn start_receive(
        &mut self,
        address: u16,
        len: usize,
        done: CompletionSignal,
    ) -> Result<(), String>;
}
