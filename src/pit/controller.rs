//! `PitController`: the PID + mode state machine + output conditioning
//! engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::{MacAddr, OutputEvent, OutputKind, ProbeReading, StatusSnapshot, TempUnit};

use super::types::{ConnectedProbeState, Mode, PidGains, PidState, LAMBDA};

/// Controller sub-tick period; four sub-ticks make one heavy (measurement)
/// tick.
pub const DO_WORK_PERIOD: Duration = Duration::from_millis(250);
/// Heavy-tick (PID/mode/output) period.
pub const TEMP_MEASURE_PERIOD: Duration = Duration::from_millis(1000);
/// Sub-ticks per heavy tick.
const SUBTICKS_PER_HEAVY_TICK: u8 = 4;
/// Long-PWM (SRTP) window width, in sub-ticks (10 s at 250 ms/sub-tick).
const LONG_PWM_WINDOW_SUBTICKS: u8 = 40;

/// Dead-band below which a servo move is suppressed.
pub const SERVO_MIN_THRESH: u8 = 5;
/// Hold-off ticks after which a suppressed servo move is forced through.
pub const SERVO_MAX_HOLDOFF: u8 = 10;

const TEMP_EMA_ALPHA: f32 = 2.0 / (1.0 + 60.0);
const OUTPUT_EMA_ALPHA: f32 = 2.0 / (1.0 + 240.0);

/// The PID/mode/output engine. Owns no I/O; `fan`/`servo` and `status`
/// events are published on broadcast channels for the Orchestrator to
/// forward to the Motor Driver and Display Sink.
pub struct PitController {
    gains: RwLock<PidGains>,
    set_point: RwLock<f32>,
    mode: RwLock<Mode>,
    state: RwLock<PidState>,
    unit: RwLock<TempUnit>,

    /// Readings land here first; promoted to `active` at the top of the
    /// next heavy tick so a reading arriving mid-tick is never observed by
    /// that tick.
    pending: RwLock<HashMap<MacAddr, ConnectedProbeState>>,
    active: RwLock<HashMap<MacAddr, ConnectedProbeState>>,

    fan_max_speed: RwLock<u8>,
    fan_max_startup_speed: RwLock<u8>,
    fan_active_floor: RwLock<u8>,
    fan_min_speed: RwLock<u8>,
    fan_reverse: RwLock<bool>,
    servo_min_pos: RwLock<u8>,
    servo_max_pos: RwLock<u8>,
    lid_open_offset: RwLock<f32>,
    lid_open_duration_sec: RwLock<u32>,

    lid_resume_countdown_sec: RwLock<u32>,
    sub_tick: RwLock<u8>,

    last_committed_fan: RwLock<u8>,
    long_pwm_active: RwLock<bool>,
    long_pwm_quota_subticks: RwLock<u8>,
    long_pwm_window_subtick: RwLock<u8>,

    last_committed_servo: RwLock<u8>,
    servo_hold_off: RwLock<u8>,

    output_tx: broadcast::Sender<OutputEvent>,
    status_tx: broadcast::Sender<StatusSnapshot>,
    run_handle: RwLock<Option<JoinHandle<()>>>,
}

impl PitController {
    /// Build a controller at the given initial set point and unit, with
    /// default gains and output tuning. Starts in `Mode::Startup`.
    pub fn new(set_point: f32, unit: TempUnit) -> Arc<Self> {
        let (output_tx, _) = broadcast::channel(256);
        let (status_tx, _) = broadcast::channel(64);

        Arc::new(Self {
            gains: RwLock::new(PidGains::default()),
            set_point: RwLock::new(set_point),
            mode: RwLock::new(Mode::Startup),
            state: RwLock::new(PidState::default()),
            unit: RwLock::new(unit),
            pending: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            fan_max_speed: RwLock::new(100),
            fan_max_startup_speed: RwLock::new(100),
            fan_active_floor: RwLock::new(20),
            fan_min_speed: RwLock::new(0),
            fan_reverse: RwLock::new(false),
            servo_min_pos: RwLock::new(0),
            servo_max_pos: RwLock::new(100),
            lid_open_offset: RwLock::new(15.0),
            lid_open_duration_sec: RwLock::new(180),
            lid_resume_countdown_sec: RwLock::new(0),
            sub_tick: RwLock::new(0),
            last_committed_fan: RwLock::new(0),
            long_pwm_active: RwLock::new(false),
            long_pwm_quota_subticks: RwLock::new(0),
            long_pwm_window_subtick: RwLock::new(0),
            last_committed_servo: RwLock::new(0),
            servo_hold_off: RwLock::new(0),
            output_tx,
            status_tx,
            run_handle: RwLock::new(None),
        })
    }

    /// Build from a loaded [`crate::config::Config`].
    pub fn from_config(config: &crate::config::Config) -> Arc<Self> {
        let this = Self::new(config.set_point, config.units);
        *this.gains.write() = PidGains {
            p: config.pid.p,
            i: config.pid.i,
            d: config.pid.d,
        };
        *this.fan_max_speed.write() = config.fan.max_speed;
        *this.fan_max_startup_speed.write() = config.fan.max_startup_speed;
        *this.fan_active_floor.write() = config.fan.active_floor;
        *this.fan_min_speed.write() = config.fan.min_speed;
        *this.fan_reverse.write() = config.fan.reverse;
        *this.servo_min_pos.write() = config.servo.min_position;
        *this.servo_max_pos.write() = config.servo.max_position;
        *this.lid_open_offset.write() = config.lid.lid_open_offset;
        *this.lid_open_duration_sec.write() = config.lid.lid_open_duration;
        this
    }

    /// Spawn the 250 ms controller loop. Returns immediately; the loop
    /// runs until the controller is dropped.
    pub fn spawn(self: &Arc<Self>) {
        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(DO_WORK_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                this.tick();
            }
        });
        *self.run_handle.write() = Some(handle);
    }

    /// Subscribe to `fan`/`servo` output events.
    pub fn subscribe_output(&self) -> broadcast::Receiver<OutputEvent> {
        self.output_tx.subscribe()
    }

    /// Subscribe to `status` snapshots.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    // ---- public contract -------------------------------------------------

    /// Set a new target temperature; forces `Mode::Startup`, zeroes output,
    /// and clears the lid timer.
    pub fn set_set_point(&self, t: f32) {
        *self.set_point.write() = t;
        *self.mode.write() = Mode::Startup;
        self.state.write().output = 0.0;
        *self.lid_resume_countdown_sec.write() = 0;
    }

    /// Directly set the mode; zeroes output and clears the lid timer.
    pub fn set_mode(&self, m: Mode) {
        *self.mode.write() = m;
        self.state.write().output = 0.0;
        *self.lid_resume_countdown_sec.write() = 0;
    }

    /// Enter `Manual` and drive the output directly.
    pub fn set_pid_output(&self, v: f32) {
        *self.mode.write() = Mode::Manual;
        self.state.write().output = v.clamp(0.0, 100.0);
    }

    /// Record (or refresh) a connected probe's ambient reading. A unit
    /// change resets `temp_ema` to prevent a spurious D-term step.
    pub fn update_probe(&self, reading: &ProbeReading) {
        {
            let mut unit = self.unit.write();
            if *unit != reading.unit {
                *unit = reading.unit;
                self.state.write().temp_ema = None;
            }
        }
        self.pending.write().insert(
            reading.address,
            ConnectedProbeState {
                last_timestamp: reading.timestamp,
                ambient: reading.ambient,
            },
        );
    }

    /// Forget a probe (it disconnected).
    pub fn remove_probe(&self, mac: MacAddr) {
        self.pending.write().remove(&mac);
    }

    /// Current number of connected probes, as last committed.
    pub fn num_probes(&self) -> usize {
        self.active.read().len()
    }

    /// Current mode.
    pub fn mode(&self) -> Mode {
        *self.mode.read()
    }

    /// Whether the fan's polarity should be reversed when driven.
    pub fn fan_reverse(&self) -> bool {
        *self.fan_reverse.read()
    }

    // ---- clamped configuration setters ------------------------------------

    /// Highest duty the fan may ever be commanded to.
    pub fn set_fan_max_speed(&self, v: u8) {
        *self.fan_max_speed.write() = v.min(100);
    }

    /// Duty used while in `Startup`, before any fused reading exists.
    pub fn set_fan_max_startup_speed(&self, v: u8) {
        *self.fan_max_startup_speed.write() = v.min(100);
    }

    /// Below this PID percentage the fan commands 0 instead of idling.
    /// Clamped to `0..=99` to guard the active-floor remap's denominator.
    pub fn set_fan_active_floor(&self, v: u8) {
        *self.fan_active_floor.write() = v.min(99);
    }

    /// Lowest duty the fan idles at once running; below this, long-PWM.
    pub fn set_fan_min_speed(&self, v: u8) {
        *self.fan_min_speed.write() = v.min(100);
    }

    /// Lowest commandable damper position.
    pub fn set_servo_min_pos(&self, v: u8) {
        *self.servo_min_pos.write() = v.min(100);
    }

    /// Highest commandable damper position.
    pub fn set_servo_max_pos(&self, v: u8) {
        *self.servo_max_pos.write() = v.min(100);
    }

    /// Degrees-below-set-point fraction, as a percentage, that triggers
    /// `Recovery`.
    pub fn set_lid_open_offset(&self, v: f32) {
        *self.lid_open_offset.write() = v.max(0.0);
    }

    /// Seconds to hold `Recovery` before auto-resuming `Normal`. Floored at
    /// 30 s, matching the documented minimum.
    pub fn set_lid_open_duration(&self, v: u32) {
        *self.lid_open_duration_sec.write() = v.max(30);
    }

    /// Replace the PID gains wholesale.
    pub fn set_pid_gains(&self, gains: PidGains) {
        *self.gains.write() = gains;
    }

    // ---- tick loop ---------------------------------------------------------

    /// Advance one 250 ms sub-tick; runs the heavy tick every fourth call.
    fn tick(&self) {
        let is_heavy = {
            let mut sub = self.sub_tick.write();
            *sub = (*sub + 1) % SUBTICKS_PER_HEAVY_TICK;
            *sub == 0
        };

        // `commit_fan` is about to run and will emit its own fresh `Fan`
        // value for this sub-tick, so a mid-window quota transition must
        // not also emit here or the sub-tick would carry two `Fan` events.
        self.advance_long_pwm(is_heavy);

        if is_heavy {
            self.heavy_tick();
        }
    }

    fn heavy_tick(&self) {
        // 1. Swap the pending probe map into the active side and fuse.
        let active: HashMap<MacAddr, ConnectedProbeState> = {
            let mut active = self.active.write();
            *active = self.pending.read().clone();
            active.clone()
        };
        let ambients: Vec<f32> = active.values().map(|s| s.ambient).collect();
        let fused = crate::fusion::fuse(&ambients);

        if let Some(f) = fused {
            let mut state = self.state.write();
            let prev = state.temp_ema.unwrap_or(f);
            state.temp_ema = Some(TEMP_EMA_ALPHA * f + (1.0 - TEMP_EMA_ALPHA) * prev);
        }

        // 2. Compute PID, unless the lid is considered open (Recovery) or
        // there is no fused temperature yet.
        let mode = *self.mode.read();
        {
            let mut state = self.state.write();
            state.current_temp = fused;

            if mode.is_automatic() {
                if mode == Mode::Recovery || fused.is_none() {
                    state.p_term = 0.0;
                    state.d_term = 0.0;
                    state.output = 0.0;
                } else {
                    let gains = *self.gains.read();
                    let set_point = *self.set_point.read();
                    let i_max_base = *self.fan_max_startup_speed.read() as f32;
                    let computed = compute_pid(PidInputs {
                        gains,
                        set_point,
                        current_temp: f_or(fused, set_point),
                        temp_ema: state.temp_ema,
                        prev_output: state.output,
                        prev_i_term: state.i_term,
                        i_max_base,
                    });
                    state.p_term = computed.p_term;
                    state.i_term = computed.i_term;
                    state.d_term = computed.d_term;
                    state.output = computed.output;
                }
            }
            // Manual/Off: leave `output` as whatever the API setter put there.
        }

        // 3. Evaluate lid/mode transitions.
        self.evaluate_transitions(fused);

        // 4. Output EMA.
        {
            let mut state = self.state.write();
            let prev = state.output_ema;
            state.output_ema = OUTPUT_EMA_ALPHA * state.output + (1.0 - OUTPUT_EMA_ALPHA) * prev;
        }

        // 5. Commit fan, then servo, then status.
        let u = self.state.read().output;
        self.commit_fan(u);
        self.commit_servo(u);
        self.emit_status(fused);
    }

    fn evaluate_transitions(&self, current_temp: Option<f32>) {
        let set_point = *self.set_point.read();
        let mut mode = self.mode.write();
        let lid_open_duration = *self.lid_open_duration_sec.read() as f32;
        let mut countdown = self.lid_resume_countdown_sec.write();
        let lid_open_offset = *self.lid_open_offset.read();
        let output_ema = self.state.read().output_ema;

        let set_point_reached_and_settled = current_temp
            .map(|t| set_point - t <= 0.0 && (lid_open_duration - *countdown as f32) >= 30.0)
            .unwrap_or(false);

        if set_point_reached_and_settled {
            if *mode == Mode::Startup {
                self.state.write().i_term /= 2.0;
            }
            *mode = Mode::Normal;
            *countdown = 0;
        } else if *countdown > 0 {
            *countdown -= 1;
        } else if let Some(t) = current_temp {
            let lid_open_should_activate = lid_open_offset > 0.0
                && *mode == Mode::Normal
                && ((set_point - t) / set_point) >= (lid_open_offset / 100.0)
                && output_ema < 90.0;

            if lid_open_should_activate {
                *mode = Mode::Recovery;
                *countdown = lid_open_duration as u32;
            }
        }
    }

    fn commit_fan(&self, u: f32) {
        let active_floor = *self.fan_active_floor.read();
        let mode = *self.mode.read();
        let current_max = if mode == Mode::Startup {
            *self.fan_max_startup_speed.read()
        } else {
            *self.fan_max_speed.read()
        };

        let mapped = map_active_floor(u, active_floor, current_max);
        let prev = *self.last_committed_fan.read();

        let commit = if prev == 0 && mapped > 0 {
            // Boost: one 100% tick to break static friction, then settle.
            self.configure_long_pwm(mapped);
            100
        } else {
            let fan_min_speed = *self.fan_min_speed.read();
            if mapped == 0 {
                *self.long_pwm_active.write() = false;
                0
            } else if fan_min_speed == 0 || mapped >= fan_min_speed {
                *self.long_pwm_active.write() = false;
                mapped
            } else {
                self.configure_long_pwm(mapped);
                if long_pwm_is_on(
                    *self.long_pwm_window_subtick.read(),
                    *self.long_pwm_quota_subticks.read(),
                ) {
                    fan_min_speed
                } else {
                    0
                }
            }
        };

        *self.last_committed_fan.write() = commit;
        let _ = self.output_tx.send(OutputEvent {
            kind: OutputKind::Fan,
            value: commit,
        });
    }

    fn configure_long_pwm(&self, mapped: u8) {
        let fan_min_speed = *self.fan_min_speed.read();
        if fan_min_speed == 0 {
            *self.long_pwm_active.write() = false;
            return;
        }
        *self.long_pwm_active.write() = true;
        *self.long_pwm_quota_subticks.write() =
            long_pwm_quota_subticks(mapped, fan_min_speed, LONG_PWM_WINDOW_SUBTICKS);
    }

    fn advance_long_pwm(&self, suppress_emit: bool) {
        if !*self.long_pwm_active.read() {
            return;
        }
        let mut window_subtick = self.long_pwm_window_subtick.write();
        let next = (*window_subtick + 1) % LONG_PWM_WINDOW_SUBTICKS;
        let was_on = long_pwm_is_on(*window_subtick, *self.long_pwm_quota_subticks.read());
        *window_subtick = next;
        let is_on = long_pwm_is_on(next, *self.long_pwm_quota_subticks.read());
        drop(window_subtick);

        if was_on != is_on && !suppress_emit {
            let fan_min_speed = *self.fan_min_speed.read();
            let value = if is_on { fan_min_speed } else { 0 };
            *self.last_committed_fan.write() = value;
            let _ = self.output_tx.send(OutputEvent {
                kind: OutputKind::Fan,
                value,
            });
        }
    }

    fn commit_servo(&self, u: f32) {
        let servo_min_pos = *self.servo_min_pos.read();
        let servo_max_pos = *self.servo_max_pos.read();
        let target = map_servo(u, servo_min_pos, servo_max_pos);
        let prev = *self.last_committed_servo.read();
        let hold_off = *self.servo_hold_off.read();

        if should_emit_servo(target, prev, hold_off) {
            *self.last_committed_servo.write() = target;
            *self.servo_hold_off.write() = 0;
            let _ = self.output_tx.send(OutputEvent {
                kind: OutputKind::Servo,
                value: target,
            });
        } else {
            *self.servo_hold_off.write() = hold_off.saturating_add(1);
        }
    }

    fn emit_status(&self, pit_temp: Option<f32>) {
        let snapshot = StatusSnapshot {
            mode: *self.mode.read(),
            num_probes: self.active.read().len(),
            pit_temp,
            set_point: *self.set_point.read(),
            unit: *self.unit.read(),
            pid_output: self.state.read().output,
            fan_pct: *self.last_committed_fan.read(),
            servo_pct_0_100: *self.last_committed_servo.read(),
        };
        debug!(mode = %snapshot.mode, fan = snapshot.fan_pct, servo = snapshot.servo_pct_0_100, "status");
        let _ = self.status_tx.send(snapshot);
    }
}

impl Drop for PitController {
    fn drop(&mut self) {
        if let Some(handle) = self.run_handle.write().take() {
            handle.abort();
        }
        info!("Pit controller stopped");
    }
}

fn f_or(v: Option<f32>, default: f32) -> f32 {
    v.unwrap_or(default)
}

struct PidInputs {
    gains: PidGains,
    set_point: f32,
    current_temp: f32,
    temp_ema: Option<f32>,
    prev_output: f32,
    prev_i_term: f32,
    i_max_base: f32,
}

struct PidOutputs {
    p_term: f32,
    i_term: f32,
    d_term: f32,
    output: f32,
}

/// Pure PID computation. `i_max_base` is
/// `fan_max_startup_speed`; the effective ceiling is `100` once the
/// set point has been reached.
fn compute_pid(inputs: PidInputs) -> PidOutputs {
    let PidInputs {
        gains,
        set_point,
        current_temp,
        temp_ema,
        prev_output,
        prev_i_term,
        i_max_base,
    } = inputs;

    let e = set_point - current_temp;
    let reached = e <= 0.0;
    let i_max = if reached { 100.0 } else { i_max_base };

    let p_term = if gains.p >= 0.0 {
        gains.p * e
    } else {
        gains.p * (-LAMBDA * set_point + current_temp)
    };

    let i_max_ext = if gains.p < 0.0 {
        i_max + (LAMBDA - 1.0) * gains.p * set_point
    } else {
        i_max
    };

    let not_saturated = (e < 0.0 && prev_output > 0.0) || (e > 0.0 && prev_output < i_max);
    let i_term = if not_saturated {
        (prev_i_term + gains.i * e).clamp(0.0, i_max_ext)
    } else {
        prev_i_term.clamp(0.0, i_max_ext)
    };

    let d_term = gains.d * (temp_ema.unwrap_or(current_temp) - current_temp);

    let output = (p_term + i_term + d_term).clamp(0.0, 100.0);

    PidOutputs {
        p_term,
        i_term,
        d_term,
        output,
    }
}

/// Remap `u` from `[active_floor, 100]` to `[0, current_max]`; below the
/// floor the fan is off.
fn map_active_floor(u: f32, active_floor: u8, current_max: u8) -> u8 {
    if u < active_floor as f32 {
        return 0;
    }
    let floor = active_floor as f32;
    let span = (100.0 - floor).max(1.0);
    let fraction = ((u - floor) / span).clamp(0.0, 1.0);
    (fraction * current_max as f32).round() as u8
}

/// Sub-ticks, out of `window_subticks`, the fan should run at
/// `fan_min_speed` to approximate `mapped` over the window.
fn long_pwm_quota_subticks(mapped: u8, fan_min_speed: u8, window_subticks: u8) -> u8 {
    if fan_min_speed == 0 {
        return 0;
    }
    let fraction = mapped as f32 / fan_min_speed as f32;
    ((window_subticks as f32 * fraction).round() as u8).min(window_subticks)
}

/// Whether the long-PWM window is in its "on" phase at `window_subtick`:
/// on from the start of the window until the quota is exhausted, then off
/// for the remainder (a contiguous on-then-off pulse, not a spread duty).
fn long_pwm_is_on(window_subtick: u8, quota_subticks: u8) -> bool {
    window_subtick < quota_subticks
}

/// Map PID output `u` (0..=100) linearly into `[servo_min_pos, servo_max_pos]`.
fn map_servo(u: f32, servo_min_pos: u8, servo_max_pos: u8) -> u8 {
    let u = u.clamp(0.0, 100.0) / 100.0;
    let span = servo_max_pos as f32 - servo_min_pos as f32;
    (servo_min_pos as f32 + u * span).round() as u8
}

/// Hold-off gate: emit only on a move bigger than `SERVO_MIN_THRESH`, or
/// once `hold_off_counter` has reached `SERVO_MAX_HOLDOFF`.
fn should_emit_servo(new: u8, prev: u8, hold_off_counter: u8) -> bool {
    let delta = new.abs_diff(prev);
    delta > SERVO_MIN_THRESH || hold_off_counter > SERVO_MAX_HOLDOFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_start_cold_pit_output_saturates() {
        // Fresh start, cold pit: startup output should saturate at 100.
        let out = compute_pid(PidInputs {
            gains: PidGains {
                p: 2.5,
                i: 0.0035,
                d: 6.0,
            },
            set_point: 230.0,
            current_temp: 70.0,
            temp_ema: None,
            prev_output: 0.0,
            prev_i_term: 0.0,
            i_max_base: 100.0,
        });
        assert_eq!(out.output, 100.0);
    }

    #[test]
    fn test_p_negative_uses_mixed_variant() {
        let out = compute_pid(PidInputs {
            gains: PidGains {
                p: -1.0,
                i: 0.0,
                d: 0.0,
            },
            set_point: 200.0,
            current_temp: 150.0,
            temp_ema: None,
            prev_output: 0.0,
            prev_i_term: 0.0,
            i_max_base: 100.0,
        });
        let expected = -1.0 * (-LAMBDA * 200.0 + 150.0);
        assert!((out.p_term - expected).abs() < 1e-4);
    }

    #[test]
    fn test_set_point_update_forces_startup_and_zero_output() {
        let ctl = PitController::new(225.0, TempUnit::Fahrenheit);
        ctl.state.write().output = 55.0;
        *ctl.mode.write() = Mode::Normal;

        ctl.set_set_point(230.0);

        assert_eq!(ctl.mode(), Mode::Startup);
        assert_eq!(ctl.state.read().output, 0.0);
    }

    #[test]
    fn test_set_pid_output_enters_manual_and_clamps() {
        let ctl = PitController::new(225.0, TempUnit::Fahrenheit);
        ctl.set_pid_output(150.0);
        assert_eq!(ctl.mode(), Mode::Manual);
        assert_eq!(ctl.state.read().output, 100.0);
    }

    #[test]
    fn test_map_active_floor_below_floor_is_zero() {
        assert_eq!(map_active_floor(10.0, 20, 100), 0);
    }

    #[test]
    fn test_map_active_floor_full_span() {
        assert_eq!(map_active_floor(100.0, 20, 100), 100);
        assert_eq!(map_active_floor(20.0, 20, 100), 0);
    }

    #[test]
    fn test_long_pwm_quota_matches_spec_scenario_5() {
        // fan_min_speed=50, mapped=20: 4000ms on / 6000ms off over 10s.
        let quota = long_pwm_quota_subticks(20, 50, LONG_PWM_WINDOW_SUBTICKS);
        assert_eq!(quota, 16); // 16 * 250ms = 4000ms
    }

    #[test]
    fn test_long_pwm_is_on_contiguous_pulse() {
        let quota = 16;
        for i in 0..40u8 {
            assert_eq!(long_pwm_is_on(i, quota), i < quota);
        }
    }

    #[test]
    fn test_map_servo_linear() {
        assert_eq!(map_servo(0.0, 0, 100), 0);
        assert_eq!(map_servo(100.0, 0, 100), 100);
        assert_eq!(map_servo(50.0, 0, 100), 50);
        assert_eq!(map_servo(50.0, 10, 90), 50);
    }

    #[test]
    fn test_servo_hold_off_suppresses_small_moves() {
        // Small moves suppressed for 11 ticks, then forced through.
        let mut prev = 50u8;
        let mut hold_off = 0u8;
        let mut emissions = 0;
        for _ in 0..11 {
            let new = 53; // delta = 3, below SERVO_MIN_THRESH
            if should_emit_servo(new, prev, hold_off) {
                emissions += 1;
                prev = new;
                hold_off = 0;
            } else {
                hold_off += 1;
            }
        }
        assert_eq!(emissions, 1);
    }

    #[test]
    fn test_servo_hold_off_allows_large_moves_immediately() {
        assert!(should_emit_servo(80, 50, 0));
    }

    #[test]
    fn test_fusion_drops_cold_joiner_scenario() {
        // A freshly-joined cold probe should be trimmed from fusion.
        let fused = crate::fusion::fuse(&[225.0, 228.0, 226.0, 75.0]).unwrap();
        assert!((fused - 226.33).abs() < 0.1);
    }

    #[test]
    fn test_lid_open_detection_scenario() {
        // Lid-open detection: a sudden drop below set point opens Recovery.
        let ctl = PitController::new(250.0, TempUnit::Fahrenheit);
        *ctl.mode.write() = Mode::Normal;
        ctl.state.write().output_ema = 55.0;
        ctl.set_lid_open_offset(20.0);

        ctl.evaluate_transitions(Some(200.0));

        assert_eq!(ctl.mode(), Mode::Recovery);
        assert_eq!(*ctl.lid_resume_countdown_sec.read(), 180);
    }

    #[test]
    fn test_set_point_reached_transitions_to_normal_and_halves_integrator() {
        // Set point reached while in Startup: halve the integrator, enter Normal.
        let ctl = PitController::new(225.0, TempUnit::Fahrenheit);
        *ctl.mode.write() = Mode::Startup;
        ctl.state.write().i_term = 40.0;

        ctl.evaluate_transitions(Some(230.0));

        assert_eq!(ctl.mode(), Mode::Normal);
        assert_eq!(ctl.state.read().i_term, 20.0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Fan conditioning never commands more than the current ceiling,
        /// for any output/floor/ceiling combination.
        #[test]
        fn fan_output_stays_within_current_max(
            u in 0.0f32..=100.0,
            active_floor in 0u8..=99,
            current_max in 0u8..=100,
        ) {
            let mapped = map_active_floor(u, active_floor, current_max);
            prop_assert!(mapped <= current_max);
        }

        /// Servo conditioning never leaves `[servo_min_pos, servo_max_pos]`,
        /// for any output and any legally-ordered min/max pair.
        #[test]
        fn servo_output_stays_within_configured_range(
            u in 0.0f32..=100.0,
            servo_min_pos in 0u8..=100,
            extra in 0u8..=100,
        ) {
            let servo_max_pos = servo_min_pos.saturating_add(extra).min(100);
            let mapped = map_servo(u, servo_min_pos, servo_max_pos);
            prop_assert!(mapped >= servo_min_pos && mapped <= servo_max_pos);
        }

        /// The long-PWM quota never exceeds the window it is drawn from.
        #[test]
        fn long_pwm_quota_never_exceeds_window(
            mapped in 0u8..=100,
            fan_min_speed in 1u8..=100,
        ) {
            let quota = long_pwm_quota_subticks(mapped, fan_min_speed, LONG_PWM_WINDOW_SUBTICKS);
            prop_assert!(quota <= LONG_PWM_WINDOW_SUBTICKS);
        }

        /// Across any sequence of commanded positions, the hold-off gate
        /// never suppresses more than `SERVO_MAX_HOLDOFF` consecutive small
        /// moves before forcing one through.
        #[test]
        fn servo_hold_off_bounds_suppressed_run_length(
            targets in prop::collection::vec(0u8..=100, 1..64),
        ) {
            let mut prev = 50u8;
            let mut hold_off = 0u8;
            let mut suppressed_run = 0u8;

            for target in targets {
                if should_emit_servo(target, prev, hold_off) {
                    prop_assert!(suppressed_run <= SERVO_MAX_HOLDOFF + 1);
                    suppressed_run = 0;
                    prev = target;
                    hold_off = 0;
                } else {
                    suppressed_run += 1;
                    hold_off += 1;
                }
            }
        }
    }
}
