pub mod i2c;
pub mod peripheral;
pub mod transport;

pub use peripheral::BusPeripheral;
pub use transport::{BusGuard, BusState, BusTransport};
