//! A single BLE temperature probe: connection lifecycle, GATT
//! initialization, and the 1 Hz poll/decode cycle.

use std::sync::Arc;
use std::time::Duration;

use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::connection::ConnectionManager;
use crate::ble::uuids::{BATTERY_CHARACTERISTIC_UUID, TEMPERATURE_CHARACTERISTIC_UUID};
use crate::error::{Error, Result};
use crate::types::{MacAddr, ProbeEvent, ProbeReading, TempUnit};
use crate::utils::celsius_to_fahrenheit;

/// Connect budget.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(12);
/// Poll cadence once a probe is streaming.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle state of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeLifecycle {
    /// Visible on the air but not yet connected.
    Discovered,
    /// Connection attempt in progress.
    Connecting,
    /// Connected and GATT characteristics resolved; not yet polling.
    Initialized,
    /// Actively polling temperature/battery at [`POLL_INTERVAL`].
    Streaming,
    /// No longer connected; will not be polled again.
    Disconnected,
}

/// A single BLE temperature probe, owned by the probe manager.
pub struct Probe {
    address: MacAddr,
    connection: ConnectionManager,
    characteristics: RwLock<Option<CharacteristicHandler>>,
    state: RwLock<ProbeLifecycle>,
    probe_index: RwLock<Option<u8>>,
    firmware: RwLock<Option<String>>,
    poll_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl Probe {
    /// Create a new, not-yet-connected probe handle.
    pub fn new(address: MacAddr, peripheral: Peripheral) -> Self {
        Self {
            address,
            connection: ConnectionManager::new(address, peripheral),
            characteristics: RwLock::new(None),
            state: RwLock::new(ProbeLifecycle::Discovered),
            probe_index: RwLock::new(None),
            firmware: RwLock::new(None),
            poll_handle: RwLock::new(None),
        }
    }

    /// The probe's BLE MAC address.
    pub fn address(&self) -> MacAddr {
        self.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ProbeLifecycle {
        *self.state.read()
    }

    /// Firmware version string, once initialized.
    pub fn firmware(&self) -> Option<String> {
        self.firmware.read().clone()
    }

    /// Probe index (1..=4) reported by firmware, once initialized.
    pub fn probe_index(&self) -> Option<u8> {
        *self.probe_index.read()
    }

    /// Connect, discover GATT characteristics, parse the firmware/index
    /// string, and spawn the polling task. On success, emits `Connect` and
    /// then `Update`/`Disconnect` events on `event_tx` as they occur; on
    /// failure, emits `ConnectFailed` and returns the error.
    pub async fn connect_and_initialize(
        self: &Arc<Self>,
        unit: TempUnit,
        event_tx: broadcast::Sender<ProbeEvent>,
    ) -> Result<()> {
        *self.state.write() = ProbeLifecycle::Connecting;

        let connect_result = tokio::time::timeout(CONNECT_TIMEOUT, self.connection.connect()).await;

        match connect_result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *self.state.write() = ProbeLifecycle::Disconnected;
                let _ = event_tx.send(ProbeEvent::ConnectFailed(self.address));
                return Err(e);
            }
            Err(_) => {
                *self.state.write() = ProbeLifecycle::Disconnected;
                let _ = event_tx.send(ProbeEvent::ConnectFailed(self.address));
                return Err(Error::ConnectFailed {
                    mac: self.address.to_string(),
                    reason: format!("no response within {CONNECT_TIMEOUT:?}"),
                });
            }
        }

        let handler = CharacteristicHandler::new(self.connection.peripheral().clone());
        handler.discover_characteristics().await?;

        if !handler.has_characteristic(&TEMPERATURE_CHARACTERISTIC_UUID)
            || !handler.has_characteristic(&BATTERY_CHARACTERISTIC_UUID)
        {
            *self.state.write() = ProbeLifecycle::Disconnected;
            let _ = event_tx.send(ProbeEvent::ConnectFailed(self.address));
            return Err(Error::CharacteristicNotFound {
                uuid: TEMPERATURE_CHARACTERISTIC_UUID.to_string(),
            });
        }

        let revision = handler.read_firmware_revision().await?;
        let (firmware, index) = parse_firmware_revision(&revision, self.address)?;

        *self.firmware.write() = Some(firmware);
        *self.probe_index.write() = Some(index);
        *self.characteristics.write() = Some(handler);
        *self.state.write() = ProbeLifecycle::Initialized;

        let _ = event_tx.send(ProbeEvent::Connect(self.clone()));

        let probe = self.clone();
        let poll_unit = unit;
        let poll_tx = event_tx.clone();
        let handle = tokio::spawn(async move {
            probe.poll_loop(poll_unit, poll_tx).await;
        });
        *self.poll_handle.write() = Some(handle);

        Ok(())
    }

    /// Disconnect and stop polling.
    pub async fn disconnect(self: &Arc<Self>) -> Result<()> {
        if let Some(handle) = self.poll_handle.write().take() {
            handle.abort();
        }
        *self.state.write() = ProbeLifecycle::Disconnected;
        self.connection.disconnect().await
    }

    async fn poll_loop(self: Arc<Self>, unit: TempUnit, event_tx: broadcast::Sender<ProbeEvent>) {
        *self.state.write() = ProbeLifecycle::Streaming;

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if self.state() == ProbeLifecycle::Disconnected {
                break;
            }

            match self.poll_once(unit).await {
                Ok(reading) => {
                    let _ = event_tx.send(ProbeEvent::Update(reading));
                }
                Err(e) if is_disconnect_like(&e) => {
                    debug!("{}: disconnected during poll: {}", self.address, e);
                    *self.state.write() = ProbeLifecycle::Disconnected;
                    let _ = event_tx.send(ProbeEvent::Disconnect(self.address));
                    break;
                }
                Err(e) => {
                    warn!("{}: poll error: {}", self.address, e);
                }
            }
        }
    }

    async fn poll_once(&self, unit: TempUnit) -> Result<ProbeReading> {
        let (temp_bytes, batt_bytes) = {
            let guard = self.characteristics.read();
            let handler = guard.as_ref().ok_or_else(|| Error::NotConnected {
                mac: self.address.to_string(),
            })?;
            (
                handler.read(&TEMPERATURE_CHARACTERISTIC_UUID),
                handler.read(&BATTERY_CHARACTERISTIC_UUID),
            )
        };
        let temp_bytes = temp_bytes.await?;
        let batt_bytes = batt_bytes.await?;

        let mut reading = decode_reading(
            self.address,
            self.probe_index().unwrap_or(0),
            &temp_bytes,
            &batt_bytes,
            unit,
        )?;
        reading.firmware = self.firmware().unwrap_or_default();
        Ok(reading)
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe")
            .field("address", &self.address)
            .field("state", &self.state())
            .field("probe_index", &self.probe_index())
            .field("firmware", &self.firmware())
            .finish()
    }
}

/// Split a firmware revision string `"<firmware>_<index>"` into its parts.
fn parse_firmware_revision(revision: &str, address: MacAddr) -> Result<(String, u8)> {
    let (firmware, index_str) = revision.split_once('_').ok_or_else(|| Error::DecodeError {
        mac: address.to_string(),
        context: format!("firmware revision missing '_' separator: {revision:?}"),
    })?;

    let index: u8 = index_str.parse().map_err(|_| Error::DecodeError {
        mac: address.to_string(),
        context: format!("firmware revision has non-numeric index: {revision:?}"),
    })?;

    if !(1..=4).contains(&index) {
        return Err(Error::DecodeError {
            mac: address.to_string(),
            context: format!("probe index {index} out of range 1..=4"),
        });
    }

    Ok((firmware.to_string(), index))
}

/// Decode a (temperature, battery) characteristic read into a
/// [`ProbeReading`].
fn decode_reading(
    address: MacAddr,
    probe_index: u8,
    temp_bytes: &[u8],
    batt_bytes: &[u8],
    unit: TempUnit,
) -> Result<ProbeReading> {
    if temp_bytes.len() < 6 {
        return Err(Error::DecodeError {
            mac: address.to_string(),
            context: format!("temperature payload too short: {} bytes", temp_bytes.len()),
        });
    }
    if batt_bytes.len() < 2 {
        return Err(Error::DecodeError {
            mac: address.to_string(),
            context: format!("battery payload too short: {} bytes", batt_bytes.len()),
        });
    }

    let tip_raw = u16::from_le_bytes([temp_bytes[0], temp_bytes[1]]);
    let ra = u16::from_le_bytes([temp_bytes[2], temp_bytes[3]]);
    let oa = u16::from_le_bytes([temp_bytes[4], temp_bytes[5]]);

    let ambient_raw = tip_raw as i64 + ambient_adjustment(ra, oa);

    let tip_celsius = raw_to_celsius(tip_raw as i64);
    let ambient_celsius = raw_to_celsius(ambient_raw);

    let (tip, ambient) = match unit {
        TempUnit::Celsius => (tip_celsius, ambient_celsius),
        TempUnit::Fahrenheit => (
            celsius_to_fahrenheit(tip_celsius),
            celsius_to_fahrenheit(ambient_celsius),
        ),
    };

    let battery_raw = u16::from_le_bytes([batt_bytes[0], batt_bytes[1]]);
    let battery_pct = ((battery_raw as u32) * 10).min(100) as u8;

    Ok(ProbeReading {
        address,
        probe_index,
        tip,
        ambient,
        unit,
        battery_pct,
        timestamp: std::time::Instant::now(),
        firmware: String::new(),
    })
}

fn ambient_adjustment(ra: u16, oa: u16) -> i64 {
    let ra = ra as i64;
    let oa = (oa as i64).min(48);
    ((ra - oa) * 16 * 589 / 1487).max(0)
}

fn raw_to_celsius(raw: i64) -> f32 {
    ((raw + 8) / 16) as f32
}

fn is_disconnect_like(err: &Error) -> bool {
    matches!(err, Error::NotConnected { .. } | Error::Bluetooth(_))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_revision() {
        let addr = MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        let (fw, idx) = parse_firmware_revision("1.2.3_2", addr).unwrap();
        assert_eq!(fw, "1.2.3");
        assert_eq!(idx, 2);
    }

    #[test]
    fn test_parse_firmware_revision_rejects_missing_separator() {
        let addr = MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        assert!(parse_firmware_revision("1.2.3", addr).is_err());
    }

    #[test]
    fn test_parse_firmware_revision_rejects_out_of_range_index() {
        let addr = MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        assert!(parse_firmware_revision("1.2.3_9", addr).is_err());
    }

    #[test]
    fn test_ambient_adjustment_clamped_nonnegative() {
        // ra < oa.min(48) would go negative; must clamp to 0.
        assert_eq!(ambient_adjustment(0, 48), 0);
    }

    #[test]
    fn test_decode_reading_battery_clamped() {
        let addr = MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        let temp_bytes = [0u8, 0, 0, 0, 0, 0];
        let batt_bytes = 20u16.to_le_bytes();
        let reading =
            decode_reading(addr, 1, &temp_bytes, &batt_bytes, TempUnit::Celsius).unwrap();
        assert_eq!(reading.battery_pct, 100);
    }

    #[test]
    fn test_decode_reading_rejects_short_payload() {
        let addr = MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]);
        let batt_bytes = 5u16.to_le_bytes();
        assert!(decode_reading(addr, 1, &[0, 0], &batt_bytes, TempUnit::Celsius).is_err());
    }
}
