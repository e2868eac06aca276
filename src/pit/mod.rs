//! The Pit Controller: the PID/mode/output engine at the center of the
//! control loop.

pub mod controller;
pub mod types;

pub use controller::PitController;
pub use types::{ConnectedProbeState, Mode, PidGains, PidState, LAMBDA};
