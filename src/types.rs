//! Core data model shared across the probe manager, fusion, and pit controller.
//!
//! See the probe/fusion/controller modules for how these types flow together.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Temperature unit tag carried by every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub enum TempUnit {
    /// Degrees Fahrenheit.
    #[default]
    Fahrenheit,
    /// Degrees Celsius.
    Celsius,
}

impl fmt::Display for TempUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fahrenheit => write!(f, "F"),
            Self::Celsius => write!(f, "C"),
        }
    }
}

impl FromStr for TempUnit {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "F" | "f" | "Fahrenheit" => Ok(Self::Fahrenheit),
            "C" | "c" | "Celsius" => Ok(Self::Celsius),
            other => Err(crate::error::Error::Internal(format!(
                "unknown temperature unit: {other}"
            ))),
        }
    }
}

/// A six-byte BLE device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Construct from six raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// The three-byte manufacturer prefix (OUI) of this address.
    pub fn oui(&self) -> [u8; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }

    /// Check whether this address's OUI matches the given prefix.
    pub fn has_oui(&self, oui: [u8; 3]) -> bool {
        self.oui() == oui
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddr {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 6 {
            return Err(crate::error::Error::Internal(format!(
                "invalid MAC address: {s}"
            )));
        }
        let mut bytes = [0u8; 6];
        for (i, p) in parts.iter().enumerate() {
            bytes[i] = u8::from_str_radix(p, 16)
                .map_err(|_| crate::error::Error::Internal(format!("invalid MAC address: {s}")))?;
        }
        Ok(Self(bytes))
    }
}

/// A single normalized reading from a probe.
///
/// Immutable once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReading {
    /// The BLE address of the originating probe.
    pub address: MacAddr,
    /// Probe index reported by firmware, 1..=4.
    pub probe_index: u8,
    /// Tip (food) temperature in `unit`.
    pub tip: f32,
    /// Ambient (pit) temperature in `unit`.
    pub ambient: f32,
    /// The unit the two temperature fields are expressed in.
    pub unit: TempUnit,
    /// Battery percentage, 0..=100.
    pub battery_pct: u8,
    /// Monotonic receipt time.
    pub timestamp: Instant,
    /// Firmware version string reported by the probe.
    pub firmware: String,
}

/// The kind of output a [`crate::pit::OutputEvent`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    /// Blower fan duty.
    Fan,
    /// Intake damper / servo position.
    Servo,
}

/// A single output emission from the Pit Controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputEvent {
    /// Which output this event targets.
    pub kind: OutputKind,
    /// Percentage value, 0..=100.
    pub value: u8,
}

/// Lifecycle/data event published by a probe.
pub enum ProbeEvent {
    /// The probe connected and completed GATT initialization.
    Connect(std::sync::Arc<crate::probe::Probe>),
    /// The probe failed to connect within the connect budget.
    ConnectFailed(MacAddr),
    /// A new reading was decoded from the probe.
    Update(ProbeReading),
    /// The probe disconnected, intentionally or due to a transient I/O error.
    Disconnect(MacAddr),
}

impl Clone for ProbeEvent {
    fn clone(&self) -> Self {
        match self {
            Self::Connect(probe) => Self::Connect(probe.clone()),
            Self::ConnectFailed(mac) => Self::ConnectFailed(*mac),
            Self::Update(reading) => Self::Update(reading.clone()),
            Self::Disconnect(mac) => Self::Disconnect(*mac),
        }
    }
}

/// A point-in-time rendering of controller state for the display sink
/// rendered by a `DisplaySink`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    /// Current controller mode.
    pub mode: crate::pit::Mode,
    /// Number of currently connected probes.
    pub num_probes: usize,
    /// Fused pit temperature, if any probe data is available.
    pub pit_temp: Option<f32>,
    /// Current target temperature.
    pub set_point: f32,
    /// The unit `pit_temp` and `set_point` are expressed in.
    pub unit: TempUnit,
    /// Raw PID output percentage, 0..=100.
    pub pid_output: f32,
    /// Committed fan duty percentage, 0..=100.
    pub fan_pct: u8,
    /// Committed servo/damper position percentage, 0..=100.
    pub servo_pct_0_100: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_display_roundtrip() {
        let mac = MacAddr::new([0xB8, 0x1F, 0x5E, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "B8:1F:5E:01:02:03");
        assert_eq!(mac, "B8:1F:5E:01:02:03".parse().unwrap());
    }

    #[test]
    fn test_mac_oui() {
        let mac = MacAddr::new([0xB8, 0x1F, 0x5E, 0x01, 0x02, 0x03]);
        assert!(mac.has_oui([0xB8, 0x1F, 0x5E]));
        assert!(!mac.has_oui([0x00, 0x00, 0x00]));
    }

    #[test]
    fn test_temp_unit_from_str() {
        assert_eq!("F".parse::<TempUnit>().unwrap(), TempUnit::Fahrenheit);
        assert_eq!("C".parse::<TempUnit>().unwrap(), TempUnit::Celsius);
        assert!("K".parse::<TempUnit>().is_err());
    }
}
