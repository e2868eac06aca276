//! On-disk configuration and its validation/clamping policy.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::TempUnit;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pitctl/pitctl.toml";

const DEFAULT_KP: f32 = 2.5;
const DEFAULT_KI: f32 = 0.0035;
const DEFAULT_KD: f32 = 6.0;

const FAN_MIN_SPEED_MIN: u8 = 0;
const FAN_MIN_SPEED_MAX: u8 = 100;
const DEFAULT_FAN_MIN_SPEED: u8 = 0;

const FAN_MAX_SPEED_MIN: u8 = 0;
const FAN_MAX_SPEED_MAX: u8 = 100;
const DEFAULT_FAN_MAX_SPEED: u8 = 100;

const DEFAULT_FAN_MAX_STARTUP_SPEED: u8 = 100;

const FAN_ACTIVE_FLOOR_MIN: u8 = 0;
const FAN_ACTIVE_FLOOR_MAX: u8 = 99;
const DEFAULT_FAN_ACTIVE_FLOOR: u8 = 20;

const DEFAULT_FAN_ON_ABOVE: u8 = 1;
const DEFAULT_FAN_REVERSE: bool = false;

const SERVO_MIN_POSITION_MIN: u8 = 0;
const SERVO_MIN_POSITION_MAX: u8 = 100;
const DEFAULT_SERVO_MIN_POSITION: u8 = 0;

const SERVO_MAX_POSITION_MIN: u8 = 0;
const SERVO_MAX_POSITION_MAX: u8 = 100;
const DEFAULT_SERVO_MAX_POSITION: u8 = 100;

const DEFAULT_SET_POINT: f32 = 225.0;

const DEFAULT_LID_OPEN_OFFSET: f32 = 15.0;

/// Floor enforced on `lid.lid_open_duration`, per the documented
/// minimum.
pub const LID_OPEN_DURATION_MIN_SEC: u32 = 30;
const DEFAULT_LID_OPEN_DURATION_SEC: u32 = 180;

/// PID gains, as loaded from `[pid]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidConfig {
    /// Proportional gain.
    #[serde(default = "default_kp")]
    pub p: f32,
    /// Integral gain.
    #[serde(default = "default_ki")]
    pub i: f32,
    /// Derivative gain.
    #[serde(default = "default_kd")]
    pub d: f32,
}

fn default_kp() -> f32 {
    DEFAULT_KP
}
fn default_ki() -> f32 {
    DEFAULT_KI
}
fn default_kd() -> f32 {
    DEFAULT_KD
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            p: DEFAULT_KP,
            i: DEFAULT_KI,
            d: DEFAULT_KD,
        }
    }
}

/// Fan output configuration, as loaded from `[fan]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FanConfig {
    /// Lowest duty the fan is allowed to idle at once running.
    #[serde(default = "default_fan_min_speed")]
    pub min_speed: u8,
    /// Highest duty the fan may ever be commanded to.
    #[serde(default = "default_fan_max_speed")]
    pub max_speed: u8,
    /// Duty used during `Startup` mode, before a temperature reading exists.
    #[serde(default = "default_fan_max_startup_speed")]
    pub max_startup_speed: u8,
    /// Below this PID percentage the fan is commanded off instead of idling.
    #[serde(default = "default_fan_active_floor")]
    pub active_floor: u8,
    /// PID percentage above which the fan turns fully on instead of PWMing.
    #[serde(default = "default_fan_on_above")]
    pub on_above: u8,
    /// Whether fan polarity is reversed (some blower wiring spins backwards).
    #[serde(default = "default_fan_reverse")]
    pub reverse: bool,
}

fn default_fan_min_speed() -> u8 {
    DEFAULT_FAN_MIN_SPEED
}
fn default_fan_max_speed() -> u8 {
    DEFAULT_FAN_MAX_SPEED
}
fn default_fan_max_startup_speed() -> u8 {
    DEFAULT_FAN_MAX_STARTUP_SPEED
}
fn default_fan_active_floor() -> u8 {
    DEFAULT_FAN_ACTIVE_FLOOR
}
fn default_fan_on_above() -> u8 {
    DEFAULT_FAN_ON_ABOVE
}
fn default_fan_reverse() -> bool {
    DEFAULT_FAN_REVERSE
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            min_speed: DEFAULT_FAN_MIN_SPEED,
            max_speed: DEFAULT_FAN_MAX_SPEED,
            max_startup_speed: DEFAULT_FAN_MAX_STARTUP_SPEED,
            active_floor: DEFAULT_FAN_ACTIVE_FLOOR,
            on_above: DEFAULT_FAN_ON_ABOVE,
            reverse: DEFAULT_FAN_REVERSE,
        }
    }
}

/// Servo/damper output configuration, as loaded from `[servo]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ServoConfig {
    /// Lowest commandable damper position.
    #[serde(default = "default_servo_min_position")]
    pub min_position: u8,
    /// Highest commandable damper position.
    #[serde(default = "default_servo_max_position")]
    pub max_position: u8,
}

fn default_servo_min_position() -> u8 {
    DEFAULT_SERVO_MIN_POSITION
}
fn default_servo_max_position() -> u8 {
    DEFAULT_SERVO_MAX_POSITION
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            min_position: DEFAULT_SERVO_MIN_POSITION,
            max_position: DEFAULT_SERVO_MAX_POSITION,
        }
    }
}

/// Lid-open detection configuration, as loaded from `[lid]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidConfig {
    /// Degrees below set point a sudden drop must exceed to count as a
    /// lid-open event.
    #[serde(default = "default_lid_open_offset")]
    pub lid_open_offset: f32,
    /// Seconds to hold `Recovery` mode before returning to `Normal`.
    #[serde(default = "default_lid_open_duration_sec")]
    pub lid_open_duration: u32,
}

fn default_lid_open_offset() -> f32 {
    DEFAULT_LID_OPEN_OFFSET
}
fn default_lid_open_duration_sec() -> u32 {
    DEFAULT_LID_OPEN_DURATION_SEC
}

impl Default for LidConfig {
    fn default() -> Self {
        Self {
            lid_open_offset: DEFAULT_LID_OPEN_OFFSET,
            lid_open_duration: DEFAULT_LID_OPEN_DURATION_SEC,
        }
    }
}

/// Top-level configuration, matching the `pitctl.toml` schema.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Display/config unit for all temperatures.
    #[serde(default)]
    pub units: TempUnit,
    /// PID gains.
    #[serde(default)]
    pub pid: PidConfig,
    /// Fan output tuning.
    #[serde(default)]
    pub fan: FanConfig,
    /// Servo/damper output tuning.
    #[serde(default)]
    pub servo: ServoConfig,
    /// Target pit temperature, in `units`.
    #[serde(default = "default_set_point")]
    pub set_point: f32,
    /// Lid-open detection tuning.
    #[serde(default)]
    pub lid: LidConfig,
}

fn default_set_point() -> f32 {
    DEFAULT_SET_POINT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: TempUnit::default(),
            pid: PidConfig::default(),
            fan: FanConfig::default(),
            servo: ServoConfig::default(),
            set_point: DEFAULT_SET_POINT,
            lid: LidConfig::default(),
        }
    }
}

impl Config {
    /// Load and validate a config file from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut config: Config = toml::from_str(&text).map_err(|e| Error::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        for clamp in config.validate() {
            tracing::warn!("{}", clamp);
        }
        Ok(config)
    }

    /// Clamp every field to its documented range. Never fails: out-of-range
    /// configuration is reported, not fatal. Returns one
    /// [`Error::InvalidConfig`] per value that had to move, for callers that
    /// want to observe or surface the clamping.
    pub fn validate(&mut self) -> Vec<Error> {
        let mut clamps = Vec::new();
        clamp_u8(
            &mut self.fan.min_speed,
            FAN_MIN_SPEED_MIN,
            FAN_MIN_SPEED_MAX,
            "fan.min_speed",
            &mut clamps,
        );
        clamp_u8(
            &mut self.fan.max_speed,
            FAN_MAX_SPEED_MIN,
            FAN_MAX_SPEED_MAX,
            "fan.max_speed",
            &mut clamps,
        );
        clamp_u8(
            &mut self.fan.active_floor,
            FAN_ACTIVE_FLOOR_MIN,
            FAN_ACTIVE_FLOOR_MAX,
            "fan.active_floor",
            &mut clamps,
        );
        clamp_u8(
            &mut self.servo.min_position,
            SERVO_MIN_POSITION_MIN,
            SERVO_MIN_POSITION_MAX,
            "servo.min_position",
            &mut clamps,
        );
        clamp_u8(
            &mut self.servo.max_position,
            SERVO_MAX_POSITION_MIN,
            SERVO_MAX_POSITION_MAX,
            "servo.max_position",
            &mut clamps,
        );
        if self.fan.min_speed > self.fan.max_speed {
            clamps.push(Error::InvalidConfig {
                field: "fan.min_speed".into(),
                value: self.fan.min_speed.to_string(),
                clamped: self.fan.max_speed.to_string(),
            });
            self.fan.min_speed = self.fan.max_speed;
        }
        if self.servo.min_position > self.servo.max_position {
            clamps.push(Error::InvalidConfig {
                field: "servo.min_position".into(),
                value: self.servo.min_position.to_string(),
                clamped: self.servo.max_position.to_string(),
            });
            self.servo.min_position = self.servo.max_position;
        }
        if self.lid.lid_open_duration < LID_OPEN_DURATION_MIN_SEC {
            clamps.push(Error::InvalidConfig {
                field: "lid.lid_open_duration".into(),
                value: self.lid.lid_open_duration.to_string(),
                clamped: LID_OPEN_DURATION_MIN_SEC.to_string(),
            });
            self.lid.lid_open_duration = LID_OPEN_DURATION_MIN_SEC;
        }
        clamps
    }
}

fn clamp_u8(value: &mut u8, min: u8, max: u8, field: &str, clamps: &mut Vec<Error>) {
    let clamped = (*value).clamp(min, max);
    if clamped != *value {
        clamps.push(Error::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
            clamped: clamped.to_string(),
        });
        *value = clamped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_already_valid() {
        let mut config = Config::default();
        let before = config;
        assert!(config.validate().is_empty());
        assert_eq!(config, before);
    }

    #[test]
    fn test_validate_reports_clamped_fields() {
        let mut config = Config {
            fan: FanConfig {
                active_floor: 150,
                ..Config::default().fan
            },
            ..Config::default()
        };
        let clamps = config.validate();
        assert_eq!(clamps.len(), 1);
        assert!(matches!(
            &clamps[0],
            Error::InvalidConfig { field, .. } if field == "fan.active_floor"
        ));
    }

    #[test]
    fn test_validate_preserves_legal_active_floor() {
        let mut config = Config {
            fan: FanConfig {
                active_floor: 90,
                ..Config::default().fan
            },
            ..Config::default()
        };
        config.validate();
        assert_eq!(config.fan.active_floor, 90);
    }

    #[test]
    fn test_validate_clamps_out_of_range_active_floor() {
        let mut config = Config {
            fan: FanConfig {
                active_floor: 150,
                ..Config::default().fan
            },
            ..Config::default()
        };
        config.validate();
        assert_eq!(config.fan.active_floor, FAN_ACTIVE_FLOOR_MAX);
    }

    #[test]
    fn test_validate_enforces_lid_duration_floor() {
        let mut config = Config {
            lid: LidConfig {
                lid_open_duration: 5,
                ..Config::default().lid
            },
            ..Config::default()
        };
        config.validate();
        assert_eq!(config.lid.lid_open_duration, LID_OPEN_DURATION_MIN_SEC);
    }

    #[test]
    fn test_validate_swaps_inverted_fan_bounds() {
        let mut config = Config {
            fan: FanConfig {
                min_speed: 80,
                max_speed: 30,
                ..Config::default().fan
            },
            ..Config::default()
        };
        config.validate();
        assert_eq!(config.fan.min_speed, config.fan.max_speed);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Config::load("/nonexistent/pitctl.toml").unwrap_err();
        assert!(matches!(err, Error::ConfigLoad { .. }));
    }
}
