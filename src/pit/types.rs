//! Data types owned by the Pit Controller.

use std::time::Instant;

/// PID gains. `P < 0` selects the Proportional-on-Mixed-Error-and-Measurement
/// variant with fixed mixing constant λ = 0.4.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    /// Proportional gain.
    pub p: f32,
    /// Integral gain.
    pub i: f32,
    /// Derivative gain.
    pub d: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            p: 2.5,
            i: 0.0035,
            d: 6.0,
        }
    }
}

/// Fixed mixing constant for the `P < 0` Proportional-on-Mixed-Error variant.
pub const LAMBDA: f32 = 0.4;

/// Running PID state, recomputed every heavy tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PidState {
    /// Proportional contribution from the most recent computation.
    pub p_term: f32,
    /// Integral accumulator.
    pub i_term: f32,
    /// Derivative contribution from the most recent computation.
    pub d_term: f32,
    /// Clamped `[0, 100]` output.
    pub output: f32,
    /// Smoothed output, α = 2/(1+240).
    pub output_ema: f32,
    /// Smoothed fused pit temperature, α = 2/(1+60). `None` until the first
    /// fused reading arrives, and reset to `None` on a unit change.
    pub temp_ema: Option<f32>,
    /// The fused pit temperature used in the most recent computation.
    pub current_temp: Option<f32>,
}

/// Controller mode, ordered: values `<= Normal` are "automatic".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    /// Initial mode; PID runs with a startup-capped integrator ceiling.
    Startup = 0,
    /// Lid-open detected; control suspended, output forced to zero.
    Recovery = 1,
    /// Normal closed-loop control.
    Normal = 2,
    /// Output is driven directly by `set_pid_output`.
    Manual = 3,
    /// Output forced to zero; no control.
    Off = 4,
}

impl Mode {
    /// Whether this mode is one of the PID's automatic modes
    /// (`Startup`, `Recovery`, `Normal`).
    pub fn is_automatic(self) -> bool {
        self <= Mode::Normal
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Startup => "Startup",
            Self::Recovery => "Recovery",
            Self::Normal => "Normal",
            Self::Manual => "Manual",
            Self::Off => "Off",
        };
        write!(f, "{s}")
    }
}

/// Per-probe state tracked inside the Pit Controller, keyed by MAC.
#[derive(Debug, Clone, Copy)]
pub struct ConnectedProbeState {
    /// When this probe's last reading was recorded.
    pub last_timestamp: Instant,
    /// The probe's most recent ambient reading, in the controller's unit.
    pub ambient: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_ordinal_order() {
        assert!(Mode::Startup < Mode::Recovery);
        assert!(Mode::Recovery < Mode::Normal);
        assert!(Mode::Normal < Mode::Manual);
        assert!(Mode::Manual < Mode::Off);
    }

    #[test]
    fn test_mode_is_automatic() {
        assert!(Mode::Startup.is_automatic());
        assert!(Mode::Recovery.is_automatic());
        assert!(Mode::Normal.is_automatic());
        assert!(!Mode::Manual.is_automatic());
        assert!(!Mode::Off.is_automatic());
    }

    #[test]
    fn test_pid_gains_default() {
        let gains = PidGains::default();
        assert_eq!(gains.p, 2.5);
        assert_eq!(gains.i, 0.0035);
        assert_eq!(gains.d, 6.0);
    }
}
