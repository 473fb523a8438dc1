// Public modules
pub mod bus;
pub mod config;
pub mod errors;
pub mod events;
pub mod hal;
pub mod header;
pub mod registry;
pub mod sequencer;
pub mod stats;
pub mod sync;
pub mod worker;

// Re-export commonly used types
pub use bus::BusPeripheral;
pub use config::{load_hal_config, HalConfig};
pub use errors::{HalError, HalResult, HalStatus};
pub use events::{EventBridge, EventKind};
pub use hal::SensorHubHal;
pub use registry::{ControlLine, NullLine, RxHandler, UnitLines};
pub use stats::HalStats;
pub use sync::CompletionSignal;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}
