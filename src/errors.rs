use thiserror::Error;
use crate::bus::i2c::I2CError;

/// Status codes reported to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalStatus {
    Ok,
    BadParam,
    Io,
}

/// Errors returned by the HAL entry points
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Unit {unit} out of range (deployed units: {units})")]
    BadParam { unit: usize, units: usize },

    #[error("Transfer of {len} bytes exceeds the {max}-byte transfer limit")]
    TransferTooLarge { len: usize, max: usize },

    #[error("Unit {unit} has no bus address yet; reset it first")]
    Unconfigured { unit: usize },

    #[error("Bus transaction at {address:#04x} failed: {reason}")]
    Io { address: u16, reason: String },

    #[error("Peripheral rejected transaction at {address:#04x}: {reason}")]
    Rejected { address: u16, reason: String },

    #[error("Bus transaction at {address:#04x} timed out after {timeout_ms}ms")]
    Timeout { address: u16, timeout_ms: u64 },

    #[error("I2C communication failed: {0}")]
    I2cError(#[from] I2CError),

    #[error("HAL must be initialized from within a tokio runtime")]
    Runtime,

    #[error("Invalid HAL configuration: {0}")]
    Config(#[from] ConfigError),
}

impl HalError {
    /// Collapse the error into one of the three protocol-layer status codes
    pub fn status(&self) -> HalStatus {
        match self {
            HalError::BadParam { .. }
            | HalError::TransferTooLarge { .. }
            | HalError::Config(_) => HalStatus::BadParam,
            HalError::Unconfigured { .. }
            | HalError::Io { .. }
            | HalError::Rejected { .. }
            | HalError::Timeout { .. }
            | HalError::I2cError(_)
            | HalError::Runtime => HalStatus::Io,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    LoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration format: {0}")]
    FormatError(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type aliases for convenience
pub type HalResult<T> = Result<T, HalError>;
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let bad = HalError::BadParam { unit: 3, units: 1 };
        assert_eq!(bad.status(), HalStatus::BadParam);

        let big = HalError::TransferTooLarge { len: 500, max: 384 };
        assert_eq!(big.status(), HalStatus::BadParam);

        let io = HalError::Io { address: 0x4A, reason: "nack".to_string() };
        assert_eq!(io.status(), HalStatus::Io);
        assert!(io.to_string().contains("0x4a"));

        assert_eq!(HalError::Unconfigured { unit: 0 }.status(), HalStatus::Io);
    }
}
