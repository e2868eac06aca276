//! Error types for the pitctl crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Failed to establish a connection to a probe within the connect timeout.
    #[error("Connect failed for {mac}: {reason}")]
    ConnectFailed {
        /// The probe's MAC address.
        mac: String,
        /// Description of why the connection failed.
        reason: String,
    },

    /// Operation requires a connection but the probe is not connected.
    #[error("Probe not connected: {mac}")]
    NotConnected {
        /// The probe's MAC address.
        mac: String,
    },

    /// Data received from a probe did not decode to a known format.
    #[error("Decode error for {mac}: {context}")]
    DecodeError {
        /// The probe's MAC address.
        mac: String,
        /// Description of what was invalid about the data.
        context: String,
    },

    /// A GATT characteristic expected on the probe was not present.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The motor driver never reported `initialized()` after exhausting retries.
    #[error("Motor driver not ready after {attempts} attempts")]
    MotorDriverNotReady {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// A configuration value was outside its documented range and was clamped.
    ///
    /// Logged as a warning rather than surfaced as fatal; the
    /// variant exists so callers that want to observe clamping can do so.
    #[error("Invalid config value for {field}: {value} clamped to {clamped}")]
    InvalidConfig {
        /// The name of the config field.
        field: String,
        /// The out-of-range value as read.
        value: String,
        /// The value it was clamped to.
        clamped: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("Failed to load config from {path}: {reason}")]
    ConfigLoad {
        /// The path that was read.
        path: String,
        /// Description of the failure.
        reason: String,
    },

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::NotConnected {
            mac: "AA:BB:CC:DD:EE:FF".to_string(),
        };
        assert_eq!(e.to_string(), "Probe not connected: AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_invalid_config_display() {
        let e = Error::InvalidConfig {
            field: "fan.active_floor".to_string(),
            value: "150".to_string(),
            clamped: "99".to_string(),
        };
        assert_eq!(
            e.to_string(),
            "Invalid config value for fan.active_floor: 150 clamped to 99"
        );
    }
}
