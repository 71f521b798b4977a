//! Instrument controller
//!
//! Owns every piece of per-instrument state and wires the scan pipeline:
//! sampler -> response curve -> gate -> {resolver, voice manager} -> MIDI output.
//!
//! Sensor channels:
//! - 0..=5: strings; channel `n` plays string `5 - n` (channel 0 is the 6th string)
//! - 6: effector pad, pitch bend while held
//! - 7: chord pad, strums the whole chord

use crate::chord::{note_name, resolve, ChordError, ChordShapeTable, ResolvedChord, VoicingContext};
use crate::midi::{MidiEvent, MidiOutput, VoiceManager, PITCH_BEND_CENTER};
use crate::sensor::{
    ChannelGate, GateError, GateEvent, GateState, GateTiming, MuxSampler, SensorBus, TickSource,
    VelocityShaper, VoltageGate, MUX_CHANNELS,
};

use super::config::{
    check_reachable, wrap_capotasto, InstrumentConfig, PITCH_BEND_RANGE_MAX, VELOCITY_OFFSET_MAX,
};

/// Sensor channels wired to strings
pub const STRING_CHANNELS: usize = 6;
/// Sensor channel of the pitch-bend pad
pub const EFFECTOR_CHANNEL: usize = 6;
/// Sensor channel of the chord pad
pub const CHORD_PAD_CHANNEL: usize = 7;

/// Controller numbers used by the instrument
pub mod cc {
    pub const CHORUS_PROGRAM: u8 = 81;
    pub const CHORUS_LEVEL: u8 = 93;
    pub const CHORUS_FEEDBACK: u8 = 59;
    pub const CHORUS_DELAY: u8 = 60;
    pub const DATA_ENTRY: u8 = 6;
    pub const RPN_MSB: u8 = 100;
    pub const RPN_LSB: u8 = 101;
}

/// Chorus program selected while after-touch is held
const CHORUS_PROGRAM_AFTER_TOUCH: u8 = 3;

/// Pitch bend at the lightest effector strike
const BEND_BASE: u16 = 9000;
/// Extra bend reached at full velocity
const BEND_SPAN: u32 = 7000;

/// Pitch bend for an effector strike of `velocity`
fn bend_for_velocity(velocity: u8) -> u16 {
    BEND_BASE + (BEND_SPAN * velocity.min(127) as u32 / 127) as u16
}

/// Piezo guitar controller
pub struct InstrumentController<B: SensorBus, C: TickSource, O: MidiOutput> {
    sampler: MuxSampler<B>,
    clock: C,
    output: O,
    config: InstrumentConfig,
    timing: GateTiming,
    shaper: VelocityShaper,
    shapes: ChordShapeTable,
    context: VoicingContext,
    /// Voicing changed since the last scan; sounding notes are stale
    context_changed: bool,
    gates: [ChannelGate; MUX_CHANNELS],
    voices: VoiceManager,
    bend_active: bool,
    /// Channels currently holding after-touch; chorus stays on while any do
    after_touch_held: usize,
}

impl<B: SensorBus, C: TickSource, O: MidiOutput> InstrumentController<B, C, O> {
    pub fn new(
        bus: B,
        clock: C,
        output: O,
        config: InstrumentConfig,
        shapes: ChordShapeTable,
    ) -> Result<Self, GateError> {
        let config = config.sanitized();
        config.validate()?;

        let gates = config.gates.map(ChannelGate::new);
        let context = VoicingContext {
            capotasto: config.capotasto,
            ..VoicingContext::default()
        };

        log::info!(
            "Instrument ready: MIDI ch{}, curve {:.2}, offset {}, after-touch {} ms",
            config.midi_channel + 1,
            config.velocity_curve,
            config.velocity_offset,
            config.after_touch_delay_ms
        );

        Ok(Self {
            sampler: MuxSampler::new(bus, config.sensor.reference_volts),
            clock,
            output,
            timing: config.timing(),
            shaper: config.shaper(),
            config,
            shapes,
            context,
            context_changed: false,
            gates,
            voices: VoiceManager::new(MUX_CHANNELS),
            bend_active: false,
            after_touch_held: 0,
        })
    }

    /// Send the program change and pitch-bend range to the synth
    pub fn setup(&mut self) {
        let channel = self.config.midi_channel;
        if let Some(program) = self.config.program {
            log::info!("Program change {} on ch{}", program, channel + 1);
            self.voices
                .send(MidiEvent::program_change(program, channel), &mut self.output);
        }
        self.send_pitch_bend_range();
    }

    /// One pass over all channels in numeric order
    ///
    /// A chord that fails to resolve does not stop the pass; the first such
    /// error is returned once every channel has been handled.
    pub fn scan(&mut self) -> Result<(), ChordError> {
        if self.context_changed {
            self.context_changed = false;
            log::debug!("Voicing changed, releasing sounding notes");
            self.voices.all_off(&mut self.output);
        }

        let now = self.clock.now();
        let mut first_error = None;
        for channel in 0..MUX_CHANNELS {
            let volts = self.sampler.read(channel);
            let intensity = self.config.sensor.intensity(volts);
            let event = self.gates[channel].update(intensity, now, &self.timing, &self.shaper);
            if let Some(event) = event {
                if let Err(e) = self.handle(channel, event) {
                    log::error!("ch{}: {}", channel, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn handle(&mut self, channel: usize, event: GateEvent) -> Result<(), ChordError> {
        match event {
            GateEvent::Strike {
                velocity,
                intensity,
            } => {
                log::debug!(
                    "ch{} strike: intensity {:.0}, velocity {}",
                    channel,
                    intensity,
                    velocity
                );
                match channel {
                    EFFECTOR_CHANNEL => self.bend(velocity),
                    CHORD_PAD_CHANNEL => self.strum(velocity)?,
                    _ => self.pluck(channel, velocity)?,
                }
            }
            GateEvent::AfterTouchBegan => {
                log::debug!("ch{} after-touch", channel);
                self.after_touch_held += 1;
                if self.after_touch_held == 1 {
                    self.set_chorus(
                        CHORUS_PROGRAM_AFTER_TOUCH,
                        self.config.chorus_level,
                        self.config.chorus_feedback,
                    );
                }
            }
            GateEvent::Released {
                after_touch_ended,
                forced,
            } => {
                if forced {
                    log::warn!("ch{} held too long, force-released", channel);
                } else {
                    log::debug!("ch{} released", channel);
                }
                if after_touch_ended {
                    self.after_touch_held = self.after_touch_held.saturating_sub(1);
                    if self.after_touch_held == 0 {
                        self.set_chorus(0, 0, 0);
                    }
                }
                if channel == EFFECTOR_CHANNEL {
                    self.reset_bend();
                } else {
                    self.voices.release(channel, &mut self.output);
                }
            }
        }
        Ok(())
    }

    fn pluck(&mut self, channel: usize, velocity: u8) -> Result<(), ChordError> {
        self.reset_bend();
        let string = STRING_CHANNELS - 1 - channel;
        let chord = self.voiced_chord()?;
        match chord.string(string) {
            Some(note) => {
                log::debug!("string {} -> {}", string + 1, note_name(note));
                let velocity = self.config.offset_velocity(velocity);
                let midi_channel = self.config.midi_channel;
                self.voices
                    .strike(channel, note, velocity, midi_channel, &mut self.output);
            }
            None => {
                log::debug!("string {} muted in this chord", string + 1);
                self.voices.release(channel, &mut self.output);
            }
        }
        Ok(())
    }

    fn strum(&mut self, velocity: u8) -> Result<(), ChordError> {
        self.reset_bend();
        let chord = self.voiced_chord()?;
        let notes: Vec<u8> = chord.notes().collect();
        let velocity = self.config.offset_velocity(velocity);
        let midi_channel = self.config.midi_channel;
        self.voices.strike_notes(
            CHORD_PAD_CHANNEL,
            &notes,
            velocity,
            midi_channel,
            &mut self.output,
        );
        Ok(())
    }

    fn bend(&mut self, velocity: u8) {
        let value = bend_for_velocity(velocity);
        log::debug!("pitch bend {}", value);
        self.voices.send(
            MidiEvent::pitch_bend(value, self.config.midi_channel),
            &mut self.output,
        );
        self.bend_active = true;
    }

    fn reset_bend(&mut self) {
        if self.bend_active {
            self.bend_active = false;
            self.voices.send(
                MidiEvent::pitch_bend(PITCH_BEND_CENTER, self.config.midi_channel),
                &mut self.output,
            );
        }
    }

    fn set_chorus(&mut self, program: u8, level: u8, feedback: u8) {
        let channel = self.config.midi_channel;
        for (controller, value) in [
            (cc::CHORUS_PROGRAM, program),
            (cc::CHORUS_LEVEL, level),
            (cc::CHORUS_FEEDBACK, feedback),
            (cc::CHORUS_DELAY, 0),
        ] {
            self.voices.send(
                MidiEvent::control_change(controller, value, channel),
                &mut self.output,
            );
        }
    }

    fn send_pitch_bend_range(&mut self) {
        let channel = self.config.midi_channel;
        for (controller, value) in [
            (cc::RPN_LSB, 0),
            (cc::RPN_MSB, 0),
            (cc::DATA_ENTRY, self.config.pitch_bend_range),
        ] {
            self.voices.send(
                MidiEvent::control_change(controller, value, channel),
                &mut self.output,
            );
        }
    }

    /// Current chord with the capotasto applied
    pub fn voiced_chord(&self) -> Result<ResolvedChord, ChordError> {
        let chord = resolve(&self.context, &self.shapes)?;
        Ok(chord.transposed(self.context.capotasto))
    }

    // -------------------------------------------------------------------------
    // Voicing
    // -------------------------------------------------------------------------

    pub fn context(&self) -> &VoicingContext {
        &self.context
    }

    /// Replace the whole voicing context, capotasto included
    pub fn set_context(&mut self, mut ctx: VoicingContext) {
        ctx.capotasto = wrap_capotasto(ctx.capotasto as i32);
        if ctx != self.context {
            self.context = ctx;
            self.context_changed = true;
        }
    }

    /// Change the chord but keep the current capotasto
    pub fn set_chord(&mut self, ctx: VoicingContext) {
        let capotasto = self.context.capotasto;
        self.set_context(VoicingContext { capotasto, ..ctx });
    }

    /// Set the capotasto; values past ±12 wrap to the other end
    pub fn set_capotasto(&mut self, capo: i32) -> i8 {
        let capotasto = wrap_capotasto(capo);
        self.set_context(VoicingContext {
            capotasto,
            ..self.context
        });
        capotasto
    }

    pub fn shapes(&self) -> &ChordShapeTable {
        &self.shapes
    }

    pub fn set_shapes(&mut self, shapes: ChordShapeTable) {
        self.shapes = shapes;
        self.context_changed = true;
    }

    // -------------------------------------------------------------------------
    // Runtime knobs
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn set_velocity_curve(&mut self, curve: f32) {
        self.shaper.set_curve(curve);
        self.config.velocity_curve = self.shaper.curve();
    }

    pub fn set_velocity_offset(&mut self, offset: u8) {
        self.config.velocity_offset = offset.min(VELOCITY_OFFSET_MAX);
    }

    /// Switch output channel; notes on the old channel are turned off first
    pub fn set_midi_channel(&mut self, channel: u8) {
        let channel = channel % 16;
        if channel != self.config.midi_channel {
            self.all_notes_off();
            self.config.midi_channel = channel;
        }
    }

    pub fn set_pitch_bend_range(&mut self, range: u8) {
        self.config.pitch_bend_range = range.min(PITCH_BEND_RANGE_MAX);
        self.send_pitch_bend_range();
    }

    pub fn set_chorus_levels(&mut self, level: u8, feedback: u8) {
        self.config.chorus_level = level.min(127);
        self.config.chorus_feedback = feedback.min(127);
    }

    pub fn set_thresholds(&mut self, channel: usize, gate: VoltageGate) -> Result<(), GateError> {
        gate.validate()?;
        check_reachable(channel, &gate, self.config.sensor.ceiling)?;
        if let Some(g) = self.gates.get_mut(channel) {
            g.set_thresholds(gate);
            self.config.gates[channel] = gate;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    /// Silence everything: sounding notes and an active bend
    pub fn all_notes_off(&mut self) {
        self.voices.all_off(&mut self.output);
        self.reset_bend();
    }

    pub fn gate_state(&self, channel: usize) -> Option<GateState> {
        self.gates.get(channel).map(ChannelGate::state)
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.sampler.bus_mut()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
