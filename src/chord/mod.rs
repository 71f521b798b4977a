//! Chord model
//!
//! Shape data, voicing resolution, preset banks and progressions.

use std::fmt;

pub mod bank;
pub mod resolver;
pub mod shapes;

pub use bank::{ChordBank, ChordSet, ChordSetEntry, Progression, BANK_BUTTONS, PRESET_COUNT};
pub use resolver::{resolve, ResolvedChord, VoicingContext};
pub use shapes::{
    root_index, ChordShape, ChordShapeTable, FretMap, Position, MUTED, ROOT_NAMES, STANDARD_TUNING,
    STRING_COUNT,
};

/// Data and configuration errors of the chord model
#[derive(Debug, Clone, PartialEq)]
pub enum ChordError {
    /// Root pitch class outside 0..=11
    InvalidRoot(u8),
    /// Root name not in C..B
    UnknownRoot(String),
    /// Quality index past the end of the table's quality list
    UnknownQuality(usize),
    /// Quality name the table does not know
    UnknownQualityName(String),
    /// The table has no shape for this combination
    UnknownChord { root: String, quality: String },
    MalformedFretMap {
        root: String,
        quality: String,
        reason: String,
    },
    InvalidOpenStrings([i8; STRING_COUNT]),
    Parse(String),
}

impl fmt::Display for ChordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChordError::InvalidRoot(root) => write!(f, "root pitch class {} outside 0..=11", root),
            ChordError::UnknownRoot(name) => write!(f, "unknown root '{}'", name),
            ChordError::UnknownQuality(index) => write!(f, "no chord quality at index {}", index),
            ChordError::UnknownQualityName(name) => write!(f, "unknown chord quality '{}'", name),
            ChordError::UnknownChord { root, quality } => {
                write!(f, "no shape defined for chord {}{}", root, quality)
            }
            ChordError::MalformedFretMap {
                root,
                quality,
                reason,
            } => write!(f, "malformed fret map for {}{}: {}", root, quality, reason),
            ChordError::InvalidOpenStrings(pitches) => {
                write!(f, "open-string pitches out of range: {:?}", pitches)
            }
            ChordError::Parse(msg) => write!(f, "chord data parse error: {}", msg),
        }
    }
}

impl std::error::Error for ChordError {}

/// Scientific pitch name of a MIDI note (60 = "C4")
pub fn note_name(note: u8) -> String {
    let octave = note as i16 / 12 - 1;
    format!("{}{}", ROOT_NAMES[(note % 12) as usize], octave)
}
