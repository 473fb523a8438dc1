use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::time::Duration;

use crate::errors::{ConfigError, ConfigResult};

/// Most units a single bus can carry (one per address pair)
pub const MAX_UNITS: usize = 2;

/// Largest single bus transfer
pub const DEFAULT_MAX_TRANSFER: usize = 384;
/// Bytes of packet header every chunk begins with
pub const DEFAULT_HEADER_LEN: usize = 4;
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;
pub const DEFAULT_RESET_DELAY_MS: u64 = 10;
pub const DEFAULT_DFU_BOOT_DELAY_MS: u64 = 200;

/// (normal, dfu) 7-bit addresses indexed by unit id
const DEFAULT_ADDRESSES: [(u16, u16); MAX_UNITS] = [(0x4A, 0x28), (0x4B, 0x29)];

/// Root configuration struct for `hal.toml`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HalConfig {
    pub bus: BusSection,
    pub transport: TransportConfig,
    pub timing: TimingConfig,
    pub events: EventConfig,
    pub hal: TransferConfig,
    #[serde(rename = "unit")]
    pub units: Vec<UnitEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSection {
    pub path: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self { path: "/dev/i2c-1".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    SevenBit,
    TenBit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyCycle {
    /// Tlow/Thigh = 2
    Two,
    /// Tlow/Thigh = 16/9
    SixteenNine,
}

/// Peripheral settings applied every time the transport is reinitialized
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub clock_hz: u32,
    pub addressing: AddressingMode,
    pub duty_cycle: DutyCycle,
    pub own_address: u16,
    pub general_call: bool,
    pub no_stretch: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            clock_hz: 400_000,
            addressing: AddressingMode::SevenBit,
            duty_cycle: DutyCycle::Two,
            own_address: 0,
            general_call: false,
            no_stretch: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub reset_delay_ms: u64,
    pub dfu_boot_delay_ms: u64,
    /// Unset means transactions wait for completion indefinitely
    pub transfer_timeout_ms: Option<u64>,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            reset_delay_ms: DEFAULT_RESET_DELAY_MS,
            dfu_boot_delay_ms: DEFAULT_DFU_BOOT_DELAY_MS,
            transfer_timeout_ms: None,
        }
    }
}

impl TimingConfig {
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn dfu_boot_delay(&self) -> Duration {
        Duration::from_millis(self.dfu_boot_delay_ms)
    }

    pub fn transfer_timeout(&self) -> Option<Duration> {
        self.transfer_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub queue_capacity: usize,
    /// Synthesized data-ready period for hosts with no interrupt line wired
    pub data_ready_interval_ms: Option<u64>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            data_ready_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub max_transfer: usize,
    pub header_len: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_transfer: DEFAULT_MAX_TRANSFER,
            header_len: DEFAULT_HEADER_LEN,
        }
    }
}

/// One unit entry, matching each `[[unit]]` section
#[derive(Debug, Clone, Deserialize)]
pub struct UnitEntry {
    pub id: usize,
    pub address: Option<u16>,
    pub dfu_address: Option<u16>,
    #[serde(default)]
    pub dfu_mode: bool,
}

/// The two candidate bus addresses of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitAddresses {
    pub normal: u16,
    pub dfu: u16,
}

impl UnitAddresses {
    pub fn for_mode(&self, dfu_mode: bool) -> u16 {
        if dfu_mode {
            self.dfu
        } else {
            self.normal
        }
    }
}

impl HalConfig {
    /// Number of units deployed on the bus (at least one)
    pub fn unit_count(&self) -> usize {
        self.units
            .iter()
            .map(|u| u.id + 1)
            .max()
            .unwrap_or(1)
    }

    /// Address table for every deployed unit, falling back to the factory defaults
    pub fn unit_addresses(&self) -> Vec<UnitAddresses> {
        (0..self.unit_count())
            .map(|id| {
                let (normal, dfu) = DEFAULT_ADDRESSES[id.min(MAX_UNITS - 1)];
                let entry = self.units.iter().find(|u| u.id == id);
                UnitAddresses {
                    normal: entry.and_then(|u| u.address).unwrap_or(normal),
                    dfu: entry.and_then(|u| u.dfu_address).unwrap_or(dfu),
                }
            })
            .collect()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.events.queue_capacity == 0 {
            return Err(invalid("events.queue_capacity", "must be at least 1"));
        }
        if self.hal.header_len < 2 {
            return Err(invalid("hal.header_len", "must cover the 2-byte length field"));
        }
        if self.hal.header_len >= self.hal.max_transfer {
            return Err(invalid(
                "hal.max_transfer",
                &format!("must exceed header_len ({})", self.hal.header_len),
            ));
        }
        if self.hal.max_transfer > usize::from(u16::MAX >> 1) {
            return Err(invalid("hal.max_transfer", "must fit the 15-bit length field"));
        }
        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.id >= MAX_UNITS {
                return Err(invalid(
                    "unit.id",
                    &format!("{} exceeds the {}-unit limit", unit.id, MAX_UNITS),
                ));
            }
            if !seen.insert(unit.id) {
                return Err(invalid("unit.id", &format!("duplicate unit {}", unit.id)));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse and validate config text
pub fn parse_hal_config(content: &str) -> ConfigResult<HalConfig> {
    let parsed: HalConfig = toml::from_str(content)?;
    parsed.validate()?;
    Ok(parsed)
}

/// Loads config from TOML file
pub fn load_hal_config(path: &str) -> ConfigResult<HalConfig> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::LoadError {
        path: path.to_string(),
        source,
    })?;
    parse_hal_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_single_unit_board() {
        let cfg = parse_hal_config("").unwrap();
        assert_eq!(cfg.unit_count(), 1);
        assert_eq!(cfg.events.queue_capacity, 16);
        assert_eq!(cfg.hal.max_transfer, 384);
        assert_eq!(cfg.hal.header_len, 4);
        assert_eq!(cfg.transport.clock_hz, 400_000);
        assert_eq!(cfg.transport.addressing, AddressingMode::SevenBit);
        assert_eq!(cfg.timing.transfer_timeout(), None);

        let addrs = cfg.unit_addresses();
        assert_eq!(addrs, vec![UnitAddresses { normal: 0x4A, dfu: 0x28 }]);
    }

    #[test]
    fn test_two_units_with_override() {
        let cfg = parse_hal_config(
            r#"
            [bus]
            path = "/dev/i2c-3"

            [transport]
            duty_cycle = "sixteen_nine"

            [timing]
            transfer_timeout_ms = 50

            [[unit]]
            id = 0

            [[unit]]
            id = 1
            address = 0x4C
            dfu_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.bus.path, "/dev/i2c-3");
        assert_eq!(cfg.transport.duty_cycle, DutyCycle::SixteenNine);
        assert_eq!(cfg.timing.transfer_timeout(), Some(Duration::from_millis(50)));
        assert_eq!(cfg.unit_count(), 2);

        let addrs = cfg.unit_addresses();
        assert_eq!(addrs[1], UnitAddresses { normal: 0x4C, dfu: 0x29 });
        assert_eq!(addrs[1].for_mode(true), 0x29);
        assert_eq!(addrs[0].for_mode(false), 0x4A);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(parse_hal_config("[events]\nqueue_capacity = 0").is_err());
        assert!(parse_hal_config("[hal]\nmax_transfer = 4\nheader_len = 4").is_err());
        assert!(parse_hal_config("[[unit]]\nid = 2").is_err());
        assert!(parse_hal_config("[[unit]]\nid = 0\n[[unit]]\nid = 0").is_err());
        assert!(matches!(
            parse_hal_config("[bus]\npath = 5"),
            Err(ConfigError::FormatError(_))
        ));
    }
}
