//! BLE service/characteristic UUIDs and the vendor OUI filter.

use uuid::Uuid;

/// Standard BLE Device Information Service UUID.
pub const DEVICE_INFO_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180a_0000_1000_8000_00805f9b34fb);
/// Firmware Revision characteristic UUID; returns `"<firmware>_<index>"`.
pub const FIRMWARE_REVISION_UUID: Uuid = Uuid::from_u128(0x0000_2a26_0000_1000_8000_00805f9b34fb);

/// Vendor probe service UUID.
pub const PROBE_SERVICE_UUID: Uuid = Uuid::from_u128(0xa75c_c7fc_c956_488f_ac2a_2dbc08b63a04);
/// Temperature characteristic UUID (6 bytes, little-endian u16 triples).
pub const TEMPERATURE_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7edd_a774_045e_4bbf_909b_45d1991a2876);
/// Battery characteristic UUID (2 bytes, little-endian u16).
pub const BATTERY_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x2adb_4877_68d8_4884_bd3c_d83853bf27b8);

/// Vendor OUI (Apption Labs) used to recognize an eligible probe by MAC prefix.
pub const PROBE_OUI: [u8; 3] = [0xB8, 0x1F, 0x5E];

/// Check if a service UUID is the vendor probe service.
pub fn is_probe_service(uuid: &Uuid) -> bool {
    *uuid == PROBE_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        let device_info = DEVICE_INFO_SERVICE_UUID.to_string();
        assert!(device_info.contains("180a"));

        let probe_service = PROBE_SERVICE_UUID.to_string();
        assert!(probe_service.contains("a75cc7fc"));
    }

    #[test]
    fn test_is_probe_service() {
        assert!(is_probe_service(&PROBE_SERVICE_UUID));
        assert!(!is_probe_service(&DEVICE_INFO_SERVICE_UUID));
    }

    #[test]
    fn test_probe_oui() {
        let mac = crate::types::MacAddr::new([0xB8, 0x1F, 0x5E, 0x01, 0x02, 0x03]);
        assert!(mac.has_oui(PROBE_OUI));
    }
}
