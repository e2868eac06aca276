// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # pitctl
//!
//! A closed-loop PID temperature controller for charcoal/wood barbecue
//! smokers, built around wireless BLE temperature probes.
//!
//! `pitctl` reads pit and food temperatures from wireless probes, drives a
//! blower fan and an intake damper to hold a target pit temperature, detects
//! lid-open events to suspend control, and publishes live status to a
//! display sink.
//!
//! ## Components
//!
//! - [`probe_manager`]: discovers and maintains connections to eligible
//!   BLE probes.
//! - [`probe`]: a single probe's connection/poll lifecycle.
//! - [`fusion`]: combines every connected probe's ambient reading into one
//!   pit temperature.
//! - [`pit`]: the PID/mode/output engine (`PitController`).
//! - [`motor`] / [`display`]: the fan/damper and status-rendering hardware
//!   boundaries, modeled as traits.
//! - [`orchestrator`]: wires the above together and drives the process.
//! - [`config`]: on-disk configuration (`pitctl.toml`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pitctl::config::Config;
//! use pitctl::display::NullDisplaySink;
//! use pitctl::motor::NullMotorDriver;
//! use pitctl::orchestrator::Orchestrator;
//! use pitctl::pit::PitController;
//! use pitctl::probe_manager::ProbeManager;
//! use pitctl::error::Result;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::default();
//!     let probe_manager = Arc::new(ProbeManager::new(config.units).await?);
//!     let controller = PitController::from_config(&config);
//!     let motor = Arc::new(NullMotorDriver);
//!     let display = Arc::new(NullDisplaySink);
//!
//!     let orchestrator = Orchestrator::new(probe_manager, controller, motor, display);
//!     orchestrator
//!         .run(async { tokio::signal::ctrl_c().await.ok(); })
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. The user running `pitctld` may need to be in the
//! `bluetooth` group.
//!
//! ## Feature Flags
//!
//! - `serde-data`: Enable `serde` on `uuid`'s own types, for configurations
//!   that want to (de)serialize raw characteristic UUIDs directly.

// Public modules
pub mod ble;
pub mod config;
pub mod display;
pub mod error;
pub mod fusion;
pub mod motor;
pub mod orchestrator;
pub mod pit;
pub mod probe;
pub mod probe_manager;
pub mod types;
pub mod utils;

// Re-exports for convenience
pub use config::Config;
pub use error::{Error, Result};
pub use pit::PitController;
pub use probe::Probe;
pub use probe_manager::ProbeManager;
pub use utils::{celsius_to_fahrenheit, fahrenheit_to_celsius};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _ = std::any::TypeId::of::<ProbeManager>();
        let _ = std::any::TypeId::of::<Probe>();
        let _ = std::any::TypeId::of::<PitController>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Config>();
    }

    #[test]
    fn test_temperature_conversion() {
        assert!((celsius_to_fahrenheit(100.0) - 212.0).abs() < 0.001);
        assert!((fahrenheit_to_celsius(212.0) - 100.0).abs() < 0.001);
    }
}
