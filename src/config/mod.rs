pub mod hal_config;

pub use hal_config::{
    load_hal_config, parse_hal_config, AddressingMode, DutyCycle, HalConfig, TimingConfig,
    TransferConfig, TransportConfig, UnitAddresses, UnitEntry, MAX_UNITS,
};
