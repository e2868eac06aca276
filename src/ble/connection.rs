//! Per-probe connection state tracking.
//!
//! Reconnection policy lives one layer up, in the probe manager's
//! supervisory tick; a dropped probe is simply removed and
//! picked back up on the next discovery pass, rather than retried here.

use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::types::MacAddr;

/// Connection state for a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the probe.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the probe.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The probe's MAC address.
    pub address: MacAddr,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Manages the connection lifecycle for a single probe.
pub struct ConnectionManager {
    address: MacAddr,
    peripheral: Peripheral,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral.
    pub fn new(address: MacAddr, peripheral: Peripheral) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            address,
            peripheral,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Attempt a single connection to the probe, then discover GATT services.
    ///
    /// Callers needing a bounded connect budget wrap this in
    /// `tokio::time::timeout`.
    pub async fn connect(&self) -> Result<()> {
        let current_state = *self.state.read();

        if current_state.is_connected() {
            debug!("Already connected to {}", self.address);
            return Ok(());
        }

        if current_state.is_transitioning() {
            return Err(Error::ConnectFailed {
                mac: self.address.to_string(),
                reason: "connection already in progress".to_string(),
            });
        }

        self.set_state(ConnectionState::Connecting);

        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("{} already connected at BLE level", self.address);
            self.set_state(ConnectionState::Connected);
            return Ok(());
        }

        match self.peripheral.connect().await {
            Ok(_) => {
                info!("Connected to {}", self.address);

                if let Err(e) = self.peripheral.discover_services().await {
                    warn!("{}: failed to discover services: {}", self.address, e);
                    self.set_state(ConnectionState::Disconnected);
                    return Err(Error::ConnectFailed {
                        mac: self.address.to_string(),
                        reason: format!("service discovery failed: {e}"),
                    });
                }

                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("{}: connect failed: {}", self.address, e);
                self.set_state(ConnectionState::Disconnected);
                Err(Error::ConnectFailed {
                    mac: self.address.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Disconnect from the probe.
    pub async fn disconnect(&self) -> Result<()> {
        let current_state = *self.state.read();

        if matches!(
            current_state,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            return Ok(());
        }

        self.set_state(ConnectionState::Disconnecting);

        match self.peripheral.disconnect().await {
            Ok(_) => {
                info!("Disconnected from {}", self.address);
                self.set_state(ConnectionState::Disconnected);
                Ok(())
            }
            Err(e) => {
                error!("{}: failed to disconnect cleanly: {}", self.address, e);
                self.set_state(ConnectionState::Disconnected);
                Err(Error::Bluetooth(e))
            }
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!(
                "{}: connection state changed: {} -> {}",
                self.address, old_state, new_state
            );

            let _ = self.event_tx.send(ConnectionEvent {
                address: self.address,
                state: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }
}
