//! Analog multiplexer sampling
//!
//! Eight piezo channels share one ADC input behind an 8:1 analog multiplexer
//! (4051 style). Three digital outputs carry the channel number in binary;
//! after they settle, one ADC conversion reads the selected channel.

use serde::{Deserialize, Serialize};

/// Number of multiplexed analog channels
pub const MUX_CHANNELS: usize = 8;

/// Number of channel-select lines driving the multiplexer
pub const SELECT_LINES: usize = 3;

/// Full-scale value of the 16-bit ADC reading
pub const ADC_FULL_SCALE: f32 = 65535.0;

/// Hardware boundary: selector outputs plus the shared ADC input
pub trait SensorBus {
    /// Drive one select line (0 = least significant bit)
    fn set_select_line(&mut self, line: usize, high: bool);

    /// Read the shared analog input (0..=65535)
    fn read_adc(&mut self) -> u16;
}

/// How raw volts map to the intensity domain the gates work in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorResponse {
    /// ADC reference voltage (volts at full scale)
    pub reference_volts: f32,
    /// Multiplier applied to volts³
    pub gain: f32,
    /// Intensity ceiling; anything above is treated as this value
    pub ceiling: f32,
}

impl Default for SensorResponse {
    fn default() -> Self {
        Self {
            reference_volts: 4.55,
            gain: 553.0,
            ceiling: 5000.0,
        }
    }
}

impl SensorResponse {
    /// Convert a channel voltage to strike intensity (0..=ceiling)
    ///
    /// Piezo output rises sharply with strike force, so the cubic law spreads
    /// light touches apart while hard hits saturate at the ceiling.
    pub fn intensity(&self, volts: f32) -> f32 {
        if !volts.is_finite() || volts <= 0.0 {
            return 0.0;
        }
        (volts * volts * volts * self.gain).min(self.ceiling)
    }
}

/// Multiplexed sampler over a [`SensorBus`]
///
/// Reads are not reentrant: a `select` must be followed by its `sample`
/// before another channel is selected.
pub struct MuxSampler<B: SensorBus> {
    bus: B,
    reference_volts: f32,
    selected: Option<usize>,
}

impl<B: SensorBus> MuxSampler<B> {
    pub fn new(bus: B, reference_volts: f32) -> Self {
        Self {
            bus,
            reference_volts,
            selected: None,
        }
    }

    /// Put `channel`'s bit pattern on the select lines
    pub fn select(&mut self, channel: usize) {
        debug_assert!(channel < MUX_CHANNELS, "mux channel {} out of range", channel);
        let channel = channel & (MUX_CHANNELS - 1);
        for line in 0..SELECT_LINES {
            self.bus.set_select_line(line, (channel >> line) & 0x1 == 1);
        }
        self.selected = Some(channel);
    }

    /// Convert the currently selected channel, in volts (0..=reference)
    pub fn sample(&mut self) -> f32 {
        let raw = self.bus.read_adc();
        raw as f32 * self.reference_volts / ADC_FULL_SCALE
    }

    /// Select `channel` and sample it
    pub fn read(&mut self, channel: usize) -> f32 {
        self.select(channel);
        self.sample()
    }

    /// Channel currently on the select lines
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }
}
