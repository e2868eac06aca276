//! Low-level Bluetooth Low Energy plumbing: discovery, connection state, and
//! GATT characteristic access for eligible probes.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod uuids;

pub use characteristics::CharacteristicHandler;
pub use connection::{ConnectionManager, ConnectionState};
pub use scanner::BleScanner;
pub use uuids::*;
