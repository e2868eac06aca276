//! BLE scanning functionality.
//!
//! Discovers devices matching the vendor OUI and is indifferent to anything
//! else on the air.

use btleplug::api::{Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::ble::uuids::PROBE_OUI;
use crate::error::{Error, Result};
use crate::types::MacAddr;

/// Event emitted when an eligible probe is discovered or updated.
#[derive(Debug, Clone)]
pub struct ProbeDiscoveryEvent {
    /// The probe's BLE MAC address.
    pub address: MacAddr,
    /// The peripheral handle.
    pub peripheral: Peripheral,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// BLE scanner for discovering probes by vendor OUI.
pub struct BleScanner {
    adapter: Adapter,
    is_scanning: Arc<RwLock<bool>>,
    discovered: Arc<RwLock<HashMap<MacAddr, ProbeDiscoveryEvent>>>,
    event_tx: broadcast::Sender<ProbeDiscoveryEvent>,
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl BleScanner {
    /// Create a new BLE scanner using the system's default adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        let (event_tx, _) = broadcast::channel(100);

        Ok(Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        })
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        let (event_tx, _) = broadcast::channel(100);

        Self {
            adapter,
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Begin discovery. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for probes matching OUI {:02X?}", PROBE_OUI);

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while *is_scanning.read() {
                tokio::select! {
                    Some(event) = events.next() => {
                        Self::handle_event(event, &adapter, &discovered, &event_tx).await;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Halt discovery. Devices already connected are unaffected.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        if let Some(handle) = self.scan_handle.write().take() {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Whether discovery is currently active.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// Snapshot of all currently-visible eligible devices.
    pub fn discovered_probes(&self) -> HashMap<MacAddr, ProbeDiscoveryEvent> {
        self.discovered.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeDiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// The underlying adapter handle.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn handle_event(
        event: btleplug::api::CentralEvent,
        adapter: &Adapter,
        discovered: &Arc<RwLock<HashMap<MacAddr, ProbeDiscoveryEvent>>>,
        event_tx: &broadcast::Sender<ProbeDiscoveryEvent>,
    ) {
        use btleplug::api::CentralEvent;

        match event {
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Self::process_peripheral(adapter, id, discovered, event_tx).await;
            }
            CentralEvent::DeviceUpdated(id) => {
                trace!("Device updated: {:?}", id);
                Self::process_peripheral(adapter, id, discovered, event_tx).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            CentralEvent::ManufacturerDataAdvertisement { .. } => {}
            CentralEvent::ServiceDataAdvertisement { .. } => {}
            CentralEvent::ServicesAdvertisement { .. } => {}
            CentralEvent::StateUpdate(_) => {}
        }
    }

    /// Process a discovered peripheral, filtering to the vendor OUI.
    async fn process_peripheral(
        adapter: &Adapter,
        id: btleplug::platform::PeripheralId,
        discovered: &Arc<RwLock<HashMap<MacAddr, ProbeDiscoveryEvent>>>,
        event_tx: &broadcast::Sender<ProbeDiscoveryEvent>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let address: MacAddr = match properties.address.to_string().parse() {
            Ok(mac) => mac,
            Err(_) => return,
        };

        if !address.has_oui(PROBE_OUI) {
            return;
        }

        let event = ProbeDiscoveryEvent {
            address,
            peripheral,
            rssi: properties.rssi,
        };

        discovered.write().insert(address, event.clone());

        let _ = event_tx.send(event);
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_discovery_event_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<ProbeDiscoveryEvent>();
    }
}
