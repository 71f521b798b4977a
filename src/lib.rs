//! pluckpad: strike detection and chord voicing for a piezo MIDI guitar
//!
//! Eight piezo channels (six strings, a pitch-bend pad and a chord pad) are
//! scanned through an analog multiplexer, classified into strikes, after-touch
//! and releases, and turned into MIDI note events voiced from a chord-shape
//! table.

pub mod chord;
pub mod instrument;
pub mod logging;
pub mod midi;
pub mod sensor;

pub use chord::{ChordError, ChordShapeTable, ResolvedChord, VoicingContext};
pub use instrument::{InstrumentConfig, InstrumentController, Scanner};
pub use midi::{MidiEvent, MidiEventQueue, MidiOutput};
pub use sensor::{SensorBus, TickSource};
