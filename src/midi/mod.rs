//! MIDI side of the instrument
//!
//! Provides MIDI event types, the output trait, an inter-thread event queue,
//! sounding-note bookkeeping and (with `midi-port`) a hardware port output.

#[cfg(feature = "midi-port")]
mod device;
mod events;
mod voices;

#[cfg(feature = "midi-port")]
pub use device::{list_ports, MidiPortInfo, MidiPortOutput};
pub use events::{MidiEvent, MidiEventQueue, MidiOutput, PITCH_BEND_CENTER, PITCH_BEND_MAX};
pub use voices::{VoiceManager, MIDI_CHANNELS};
