//! Per-channel touch classifier
//!
//! Turns the intensity stream of one channel into discrete strike, after-touch
//! and release events. Two thresholds form a hysteresis band: a channel opens
//! at or above the press threshold and only closes at or below the release
//! threshold, so readings wandering inside the band never chatter.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ticks::{ticks_diff, Tick};
use super::velocity::VelocityShaper;

/// Press/release threshold pair for one channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageGate {
    pub press: f32,
    pub release: f32,
}

impl VoltageGate {
    pub fn new(press: f32, release: f32) -> Result<Self, GateError> {
        let gate = Self { press, release };
        gate.validate()?;
        Ok(gate)
    }

    pub fn validate(&self) -> Result<(), GateError> {
        if !self.press.is_finite() || !self.release.is_finite() || self.press <= self.release {
            return Err(GateError::InvertedThresholds {
                press: self.press,
                release: self.release,
            });
        }
        Ok(())
    }
}

impl Default for VoltageGate {
    /// Tuned for piezo discs behind the response curve
    fn default() -> Self {
        Self {
            press: 800.0,
            release: 100.0,
        }
    }
}

/// Gate configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum GateError {
    InvertedThresholds { press: f32, release: f32 },
    /// Gain or ceiling that keeps every intensity at zero
    DeadResponse { gain: f32, ceiling: f32 },
    /// Press threshold the response curve can never reach
    UnreachablePress { channel: usize, press: f32, ceiling: f32 },
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::InvertedThresholds { press, release } => write!(
                f,
                "press threshold {} must be above release threshold {}",
                press, release
            ),
            GateError::DeadResponse { gain, ceiling } => write!(
                f,
                "sensor gain {} and ceiling {} must both be above zero",
                gain, ceiling
            ),
            GateError::UnreachablePress {
                channel,
                press,
                ceiling,
            } => write!(
                f,
                "channel {} press threshold {} is above the intensity ceiling {}",
                channel, press, ceiling
            ),
        }
    }
}

impl std::error::Error for GateError {}

/// Gate state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Active,
    ActiveAfterTouch,
}

impl GateState {
    pub fn is_active(self) -> bool {
        !matches!(self, GateState::Idle)
    }
}

/// Transition produced by one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateEvent {
    /// Idle -> Active
    Strike { velocity: u8, intensity: f32 },
    /// Active -> ActiveAfterTouch, once per activation
    AfterTouchBegan,
    /// Active/ActiveAfterTouch -> Idle
    Released {
        /// After-touch had begun and is now over
        after_touch_ended: bool,
        /// Closed by the stuck-channel watchdog rather than the sensor
        forced: bool,
    },
}

/// Timing knobs shared by all channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateTiming {
    /// Hold time before after-touch begins; <= 0 disables after-touch
    pub after_touch_delay_ms: i32,
    /// Force a release when a channel stays active this long
    pub auto_release_ms: Option<u32>,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            after_touch_delay_ms: 1000,
            auto_release_ms: None,
        }
    }
}

impl GateTiming {
    fn after_touch_enabled(&self) -> bool {
        self.after_touch_delay_ms > 0
    }
}

/// Hysteresis state machine for one channel
#[derive(Debug, Clone)]
pub struct ChannelGate {
    gate: VoltageGate,
    state: GateState,
    entered_at: Option<Tick>,
    /// Set after a watchdog release; cleared once the sensor really lets go
    latched: bool,
}

impl ChannelGate {
    pub fn new(gate: VoltageGate) -> Self {
        Self {
            gate,
            state: GateState::Idle,
            entered_at: None,
            latched: false,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn thresholds(&self) -> VoltageGate {
        self.gate
    }

    /// Tick at which the gate last opened, while it is open
    pub fn entered_at(&self) -> Option<Tick> {
        self.entered_at
    }

    /// Replace the thresholds; the current state is kept
    pub fn set_thresholds(&mut self, gate: VoltageGate) {
        self.gate = gate;
    }

    /// Feed one intensity sample taken at `now`
    pub fn update(
        &mut self,
        intensity: f32,
        now: Tick,
        timing: &GateTiming,
        shaper: &VelocityShaper,
    ) -> Option<GateEvent> {
        if intensity <= self.gate.release {
            self.latched = false;
            if self.state.is_active() {
                return Some(self.close(false));
            }
            return None;
        }

        match self.state {
            GateState::Idle => {
                if intensity >= self.gate.press && !self.latched {
                    self.state = GateState::Active;
                    self.entered_at = Some(now);
                    let velocity = shaper.velocity(intensity, self.gate.press);
                    return Some(GateEvent::Strike {
                        velocity,
                        intensity,
                    });
                }
                None
            }
            GateState::Active | GateState::ActiveAfterTouch => {
                let held = self
                    .entered_at
                    .map(|entered| ticks_diff(now, entered))
                    .unwrap_or(0);

                if let Some(limit) = timing.auto_release_ms {
                    if held >= 0 && held as u32 >= limit {
                        self.latched = true;
                        return Some(self.close(true));
                    }
                }

                if self.state == GateState::Active
                    && timing.after_touch_enabled()
                    && held >= timing.after_touch_delay_ms
                {
                    self.state = GateState::ActiveAfterTouch;
                    return Some(GateEvent::AfterTouchBegan);
                }
                None
            }
        }
    }

    /// Drop back to idle without emitting anything
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.entered_at = None;
        self.latched = false;
    }

    fn close(&mut self, forced: bool) -> GateEvent {
        let after_touch_ended = self.state == GateState::ActiveAfterTouch;
        self.state = GateState::Idle;
        self.entered_at = None;
        GateEvent::Released {
            after_touch_ended,
            forced,
        }
    }
}
