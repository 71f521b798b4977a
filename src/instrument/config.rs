//! Instrument configuration
//!
//! Loaded from JSON; every field has a default so partial files work.
//! Runtime-adjustable knobs are clamped or wrapped by [`InstrumentConfig::sanitized`]
//! instead of being rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::sensor::{
    clamp_curve, GateError, GateTiming, SensorResponse, VelocityShaper, VoltageGate, MUX_CHANNELS,
};

/// Capotasto range in semitones (either direction)
pub const CAPO_LIMIT: i8 = 12;

/// Largest velocity offset
pub const VELOCITY_OFFSET_MAX: u8 = 100;

/// Largest pitch-bend range in semitones
pub const PITCH_BEND_RANGE_MAX: u8 = 12;

/// Wrap a capotasto value: past +12 jumps to -12 and past -12 to +12
pub fn wrap_capotasto(capo: i32) -> i8 {
    let limit = CAPO_LIMIT as i32;
    if capo < -limit {
        CAPO_LIMIT
    } else if capo > limit {
        -CAPO_LIMIT
    } else {
        capo as i8
    }
}

/// Press threshold must be reachable under the intensity ceiling
pub(crate) fn check_reachable(channel: usize, gate: &VoltageGate, ceiling: f32) -> Result<(), GateError> {
    if gate.press > ceiling {
        return Err(GateError::UnreachablePress {
            channel,
            press: gate.press,
            ceiling,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Output MIDI channel (0-15)
    pub midi_channel: u8,
    /// GM program sent on setup
    pub program: Option<u8>,
    /// Pitch-bend range in semitones (0-12)
    pub pitch_bend_range: u8,
    /// Added to every shaped velocity (0-100)
    pub velocity_offset: u8,
    pub velocity_curve: f32,
    pub chorus_level: u8,
    pub chorus_feedback: u8,
    /// Hold time before after-touch; <= 0 disables it
    pub after_touch_delay_ms: i32,
    /// Force-release a channel held this long
    pub auto_release_ms: Option<u32>,
    /// Semitone transposition (-12..=12)
    pub capotasto: i8,
    /// Press/release thresholds per sensor channel
    pub gates: [VoltageGate; MUX_CHANNELS],
    pub sensor: SensorResponse,
    /// Pause between scan passes; 0 only yields
    pub scan_interval_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            midi_channel: 0,
            program: None,
            pitch_bend_range: 2,
            velocity_offset: 30,
            velocity_curve: crate::sensor::velocity::CURVE_DEFAULT,
            chorus_level: 80,
            chorus_feedback: 20,
            after_touch_delay_ms: 1000,
            auto_release_ms: None,
            capotasto: 0,
            gates: [VoltageGate::default(); MUX_CHANNELS],
            sensor: SensorResponse::default(),
            scan_interval_ms: 1,
        }
    }
}

impl InstrumentConfig {
    /// Load, sanitize and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {:?}: {}", path, e))?;
        let config = Self::from_json(&text).map_err(|e| format!("Invalid config {:?}: {}", path, e))?;
        log::info!("Loaded instrument config from {:?}", path);
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, String> {
        let raw: InstrumentConfig = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let config = raw.sanitized();
        if config != raw {
            log::warn!("Config values out of range were adjusted");
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Copy with every runtime knob brought into range
    pub fn sanitized(&self) -> Self {
        let mut config = self.clone();
        config.midi_channel %= 16;
        config.program = config.program.map(|p| p.min(127));
        config.pitch_bend_range = config.pitch_bend_range.min(PITCH_BEND_RANGE_MAX);
        config.velocity_offset = config.velocity_offset.min(VELOCITY_OFFSET_MAX);
        config.velocity_curve = clamp_curve(config.velocity_curve);
        config.chorus_level = config.chorus_level.min(127);
        config.chorus_feedback = config.chorus_feedback.min(127);
        config.capotasto = wrap_capotasto(config.capotasto as i32);
        if !config.sensor.reference_volts.is_finite() || config.sensor.reference_volts <= 0.0 {
            log::warn!(
                "Invalid reference voltage {}, using default",
                config.sensor.reference_volts
            );
            config.sensor.reference_volts = SensorResponse::default().reference_volts;
        }
        config
    }

    /// Surface thresholds and sensor settings that would keep channels silent
    pub fn validate(&self) -> Result<(), GateError> {
        let SensorResponse { gain, ceiling, .. } = self.sensor;
        if !(gain.is_finite() && gain > 0.0 && ceiling.is_finite() && ceiling > 0.0) {
            return Err(GateError::DeadResponse { gain, ceiling });
        }
        for (channel, gate) in self.gates.iter().enumerate() {
            gate.validate()?;
            check_reachable(channel, gate, ceiling)?;
        }
        Ok(())
    }

    pub fn timing(&self) -> GateTiming {
        GateTiming {
            after_touch_delay_ms: self.after_touch_delay_ms,
            auto_release_ms: self.auto_release_ms,
        }
    }

    pub fn shaper(&self) -> VelocityShaper {
        VelocityShaper::new(self.velocity_curve, self.sensor.ceiling)
    }

    /// Shaped velocity plus the offset, capped at 127
    pub fn offset_velocity(&self, velocity: u8) -> u8 {
        velocity.saturating_add(self.velocity_offset).min(127)
    }
}
