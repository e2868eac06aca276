//! GATT characteristic read/write wrapper.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ble::uuids::FIRMWARE_REVISION_UUID;
use crate::error::{Error, Result};

/// Handler for GATT characteristics on a connected probe.
pub struct CharacteristicHandler {
    peripheral: Peripheral,
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Discover and cache all characteristics, after connecting.
    pub async fn discover_characteristics(&self) -> Result<()> {
        let services = self.peripheral.services();

        let mut chars = self.characteristics.write();
        chars.clear();

        for service in services {
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!("Discovered {} characteristics", chars.len());

        Ok(())
    }

    /// Get a characteristic by UUID.
    pub fn get_characteristic(&self, uuid: &Uuid) -> Option<Characteristic> {
        self.characteristics.read().get(uuid).cloned()
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    /// Read a characteristic value.
    pub async fn read(&self, uuid: &Uuid) -> Result<Vec<u8>> {
        let characteristic = self
            .characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })?;

        let data = self
            .peripheral
            .read(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Read {} bytes from characteristic {}", data.len(), uuid);

        Ok(data)
    }

    /// Read a UTF-8 string value from a characteristic.
    pub async fn read_string(&self, uuid: &Uuid) -> Result<String> {
        let data = self.read(uuid).await?;
        String::from_utf8(data).map_err(|_| Error::DecodeError {
            mac: format!("{:?}", self.peripheral.id()),
            context: format!("invalid UTF-8 in characteristic {uuid}"),
        })
    }

    /// Read the firmware revision string, `"<firmware>_<index>"`.
    pub async fn read_firmware_revision(&self) -> Result<String> {
        self.read_string(&FIRMWARE_REVISION_UUID).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_starts_with_no_characteristics() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CharacteristicHandler>();
    }
}
