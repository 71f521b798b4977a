//! Chord-shape data: fret maps per (root, quality) and open-string pitches
//!
//! Frets are listed from the 1st (highest) string to the 6th (lowest);
//! `-1` means the string is not played.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::ChordError;

/// Strings on the instrument
pub const STRING_COUNT: usize = 6;

/// Highest fret a shape may reference
pub const MAX_FRET: i8 = 24;

/// Marker for a string that is not played
pub const MUTED: i8 = -1;

/// Pitch-class names, index = semitones above C
pub const ROOT_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Standard tuning relative to C of the scale octave: E B G D A E (1st..6th)
pub const STANDARD_TUNING: [i8; STRING_COUNT] = [16, 11, 7, 2, -3, -8];

/// Fret number per string, 1st string first
pub type FretMap = [i8; STRING_COUNT];

/// Voicing position on the neck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Low,
    High,
}

impl Position {
    pub fn toggled(self) -> Self {
        match self {
            Position::Low => Position::High,
            Position::High => Position::Low,
        }
    }
}

/// Low and high fret maps of one chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChordShape {
    pub low: FretMap,
    pub high: FretMap,
}

impl ChordShape {
    pub fn frets(&self, position: Position) -> &FretMap {
        match position {
            Position::Low => &self.low,
            Position::High => &self.high,
        }
    }
}

/// Read-only chord-shape table
///
/// Roots are always the twelve [`ROOT_NAMES`]; unknown keys in the JSON
/// form are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChordShapeTable {
    /// Quality names, in selection order (index = `VoicingContext::quality`)
    qualities: Vec<String>,
    /// Open-string pitch offsets, 1st string first
    open_strings: [i8; STRING_COUNT],
    /// root name -> quality name -> shape
    shapes: BTreeMap<String, BTreeMap<String, ChordShape>>,
}

impl ChordShapeTable {
    /// Build and validate a table
    pub fn new(
        qualities: Vec<String>,
        open_strings: [i8; STRING_COUNT],
        shapes: BTreeMap<String, BTreeMap<String, ChordShape>>,
    ) -> Result<Self, ChordError> {
        let table = Self {
            qualities,
            open_strings,
            shapes,
        };
        table.validate()?;
        Ok(table)
    }

    /// Built-in table covering every root in every standard quality
    pub fn standard() -> &'static ChordShapeTable {
        &STANDARD_TABLE
    }

    /// Parse a table from JSON text
    pub fn from_json(text: &str) -> Result<Self, ChordError> {
        let table: ChordShapeTable =
            serde_json::from_str(text).map_err(|e| ChordError::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Load a table from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read chord shapes {:?}: {}", path, e))?;
        let table = Self::from_json(&text)
            .map_err(|e| format!("Invalid chord shapes {:?}: {}", path, e))?;
        log::info!(
            "Loaded chord shapes from {:?}: {} roots, {} qualities",
            path,
            table.shapes.len(),
            table.qualities.len()
        );
        Ok(table)
    }

    /// Check every fret map and the quality list
    pub fn validate(&self) -> Result<(), ChordError> {
        if self.qualities.is_empty() {
            return Err(ChordError::Parse("no chord qualities defined".to_string()));
        }
        if self.open_strings.iter().any(|pitch| !(-24..=48).contains(pitch)) {
            return Err(ChordError::InvalidOpenStrings(self.open_strings));
        }
        for (root, by_quality) in &self.shapes {
            if root_index(root).is_none() {
                return Err(ChordError::UnknownRoot(root.clone()));
            }
            for (quality, shape) in by_quality {
                for frets in [&shape.low, &shape.high] {
                    if let Some(bad) = frets.iter().find(|f| **f < MUTED || **f > MAX_FRET) {
                        return Err(ChordError::MalformedFretMap {
                            root: root.clone(),
                            quality: quality.clone(),
                            reason: format!("fret {} outside -1..={}", bad, MAX_FRET),
                        });
                    }
                    if frets.iter().all(|f| *f == MUTED) {
                        return Err(ChordError::MalformedFretMap {
                            root: root.clone(),
                            quality: quality.clone(),
                            reason: "every string muted".to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn qualities(&self) -> &[String] {
        &self.qualities
    }

    pub fn quality_name(&self, index: usize) -> Option<&str> {
        self.qualities.get(index).map(String::as_str)
    }

    pub fn quality_index(&self, name: &str) -> Option<usize> {
        self.qualities.iter().position(|q| q == name)
    }

    pub fn open_strings(&self) -> &[i8; STRING_COUNT] {
        &self.open_strings
    }

    /// Shape for `(root, quality)`, if the table defines it
    pub fn shape(&self, root: &str, quality: &str) -> Option<&ChordShape> {
        self.shapes.get(root)?.get(quality)
    }
}

/// Index of a root name in [`ROOT_NAMES`]
pub fn root_index(name: &str) -> Option<u8> {
    ROOT_NAMES.iter().position(|n| *n == name).map(|i| i as u8)
}

// =============================================================================
// STANDARD SHAPES
// =============================================================================

/// A barre shape that moves up the neck with its root
struct MovableShape {
    quality: &'static str,
    /// Root on the 6th string, open-E form
    e_form: FretMap,
    /// Root on the 5th string, open-A form
    a_form: FretMap,
}

/// Open-position voicing replacing the lowest barre in the low position
struct OpenShape {
    root: &'static str,
    quality: &'static str,
    frets: FretMap,
}

const MOVABLE_SHAPES: &[MovableShape] = &[
    MovableShape { quality: "M",     e_form: [0, 0, 1, 2, 2, 0], a_form: [0, 2, 2, 2, 0, -1] },
    MovableShape { quality: "M7",    e_form: [0, 0, 1, 1, 2, 0], a_form: [0, 2, 1, 2, 0, -1] },
    MovableShape { quality: "7",     e_form: [0, 0, 1, 0, 2, 0], a_form: [0, 2, 0, 2, 0, -1] },
    MovableShape { quality: "6",     e_form: [0, 2, 1, 2, 2, 0], a_form: [2, 2, 2, 2, 0, -1] },
    MovableShape { quality: "aug",   e_form: [0, 1, 1, 2, 3, 0], a_form: [1, 2, 2, 3, 0, -1] },
    MovableShape { quality: "m",     e_form: [0, 0, 0, 2, 2, 0], a_form: [0, 1, 2, 2, 0, -1] },
    MovableShape { quality: "mM7",   e_form: [0, 0, 0, 1, 2, 0], a_form: [0, 1, 1, 2, 0, -1] },
    MovableShape { quality: "m7",    e_form: [0, 0, 0, 0, 2, 0], a_form: [0, 1, 0, 2, 0, -1] },
    MovableShape { quality: "m6",    e_form: [0, 2, 0, 2, 2, 0], a_form: [2, 1, 2, 2, 0, -1] },
    MovableShape { quality: "m7-5",  e_form: [0, 3, 0, 2, 1, 0], a_form: [3, 1, 0, 1, 0, -1] },
    MovableShape { quality: "add9",  e_form: [2, 0, 1, 2, 2, 0], a_form: [0, 2, 4, 2, 0, -1] },
    MovableShape { quality: "sus4",  e_form: [0, 0, 2, 2, 2, 0], a_form: [0, 3, 2, 2, 0, -1] },
    MovableShape { quality: "7sus4", e_form: [0, 0, 2, 0, 2, 0], a_form: [0, 3, 0, 2, 0, -1] },
    MovableShape { quality: "dim7",  e_form: [0, 2, 0, 2, 1, 0], a_form: [2, 1, 2, 1, 0, -1] },
];

const OPEN_SHAPES: &[OpenShape] = &[
    OpenShape { root: "C", quality: "M",    frets: [0, 1, 0, 2, 3, -1] },   // C E G C E
    OpenShape { root: "C", quality: "7",    frets: [0, 1, 3, 2, 3, -1] },
    OpenShape { root: "C", quality: "M7",   frets: [0, 0, 0, 2, 3, -1] },
    OpenShape { root: "C", quality: "add9", frets: [0, 3, 0, 2, 3, -1] },
    OpenShape { root: "D", quality: "M",    frets: [2, 3, 2, 0, -1, -1] },
    OpenShape { root: "D", quality: "m",    frets: [1, 3, 2, 0, -1, -1] },
    OpenShape { root: "D", quality: "7",    frets: [2, 1, 2, 0, -1, -1] },
    OpenShape { root: "D", quality: "6",    frets: [2, 0, 2, 0, -1, -1] },
    OpenShape { root: "D", quality: "m7-5", frets: [1, 1, 1, 0, -1, -1] },
    OpenShape { root: "D", quality: "dim7", frets: [1, 0, 1, 0, -1, -1] },
    OpenShape { root: "G", quality: "M",    frets: [3, 0, 0, 0, 2, 3] },
    OpenShape { root: "G", quality: "7",    frets: [1, 0, 0, 0, 2, 3] },
];

/// Semitones from the open 6th string (E) and 5th string (A) up to each root
const E_STRING_PITCH: i8 = 4;
const A_STRING_PITCH: i8 = 9;

fn shifted(form: &FretMap, fret: i8) -> FretMap {
    let mut frets = *form;
    for f in frets.iter_mut() {
        if *f != MUTED {
            *f += fret;
        }
    }
    frets
}

static STANDARD_TABLE: Lazy<ChordShapeTable> = Lazy::new(build_standard_table);

fn build_standard_table() -> ChordShapeTable {
    let qualities = MOVABLE_SHAPES.iter().map(|m| m.quality.to_string()).collect();
    let mut shapes: BTreeMap<String, BTreeMap<String, ChordShape>> = BTreeMap::new();

    for (root, name) in ROOT_NAMES.iter().enumerate() {
        let root = root as i8;
        let e_fret = (root - E_STRING_PITCH).rem_euclid(12);
        let a_fret = (root - A_STRING_PITCH).rem_euclid(12);

        let by_quality = shapes.entry(name.to_string()).or_default();
        for movable in MOVABLE_SHAPES {
            let e_shape = shifted(&movable.e_form, e_fret);
            let a_shape = shifted(&movable.a_form, a_fret);
            let (nearer, further) = if e_fret <= a_fret {
                (e_shape, a_shape)
            } else {
                (a_shape, e_shape)
            };

            let open = OPEN_SHAPES
                .iter()
                .find(|o| o.root == *name && o.quality == movable.quality);
            let shape = match open {
                Some(open) => ChordShape {
                    low: open.frets,
                    high: nearer,
                },
                None => ChordShape {
                    low: nearer,
                    high: further,
                },
            };
            by_quality.insert(movable.quality.to_string(), shape);
        }
    }

    ChordShapeTable {
        qualities,
        open_strings: STANDARD_TUNING,
        shapes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Pitch classes sounded by a fret map in standard tuning
    fn pitch_classes(frets: &FretMap) -> Vec<i8> {
        let mut pcs: Vec<i8> = frets
            .iter()
            .zip(STANDARD_TUNING.iter())
            .filter(|(f, _)| **f != MUTED)
            .map(|(f, open)| (open + f).rem_euclid(12))
            .collect();
        pcs.sort();
        pcs.dedup();
        pcs
    }

    #[test]
    fn test_standard_table_is_valid() {
        let table = ChordShapeTable::standard();
        assert!(table.validate().is_ok());
        assert_eq!(table.qualities().len(), MOVABLE_SHAPES.len());
        for root in ROOT_NAMES {
            for quality in table.qualities() {
                assert!(table.shape(root, quality).is_some(), "{}{}", root, quality);
            }
        }
    }

    #[test]
    fn test_c_major_shapes() {
        let shape = ChordShapeTable::standard().shape("C", "M").unwrap();
        assert_eq!(shape.low, [0, 1, 0, 2, 3, -1]);
        assert_eq!(shape.high, [3, 5, 5, 5, 3, -1]);
    }

    /// Chord tones above the root, per quality
    fn intervals(quality: &str) -> Vec<i8> {
        match quality {
            "M" => vec![0, 4, 7],
            "M7" => vec![0, 4, 7, 11],
            "7" => vec![0, 4, 7, 10],
            "6" => vec![0, 4, 7, 9],
            "aug" => vec![0, 4, 8],
            "m" => vec![0, 3, 7],
            "mM7" => vec![0, 3, 7, 11],
            "m7" => vec![0, 3, 7, 10],
            "m6" => vec![0, 3, 7, 9],
            "m7-5" => vec![0, 3, 6, 10],
            "add9" => vec![0, 2, 4, 7],
            "sus4" => vec![0, 5, 7],
            "7sus4" => vec![0, 5, 7, 10],
            "dim7" => vec![0, 3, 6, 9],
            other => panic!("no intervals for {}", other),
        }
    }

    fn chord_tones(root: &str, quality: &str) -> Vec<i8> {
        let root = root_index(root).unwrap() as i8;
        let mut pcs: Vec<i8> = intervals(quality).iter().map(|i| (root + i) % 12).collect();
        pcs.sort();
        pcs
    }

    #[test]
    fn test_shapes_sound_their_chord() {
        let table = ChordShapeTable::standard();
        // C major = C E G, A minor = A C E, G7 = G B D F
        for (root, quality, expected) in [
            ("C", "M", vec![0, 4, 7]),
            ("A", "m", vec![0, 4, 9]),
            ("G", "7", vec![2, 5, 7, 11]),
            ("F#", "m7", vec![1, 4, 6, 9]),
            ("C", "6", vec![0, 4, 7, 9]),
            ("C", "aug", vec![0, 4, 8]),
            ("C", "mM7", vec![0, 3, 7, 11]),
            ("C", "m6", vec![0, 3, 7, 9]),
            ("C", "m7-5", vec![0, 3, 6, 10]),
            ("C", "add9", vec![0, 2, 4, 7]),
            ("C", "dim7", vec![0, 3, 6, 9]),
            ("D", "m7-5", vec![0, 2, 5, 8]),
        ] {
            let shape = table.shape(root, quality).unwrap();
            assert_eq!(pitch_classes(&shape.low), expected, "{}{} low", root, quality);
            assert_eq!(pitch_classes(&shape.high), expected, "{}{} high", root, quality);
        }
    }

    #[test]
    fn test_every_shape_stays_inside_its_chord() {
        let table = ChordShapeTable::standard();
        for root in ROOT_NAMES {
            for quality in table.qualities() {
                let tones = chord_tones(root, quality);
                let shape = table.shape(root, quality).unwrap();
                for (position, frets) in [("low", &shape.low), ("high", &shape.high)] {
                    let pcs = pitch_classes(frets);
                    assert!(
                        pcs.iter().all(|pc| tones.contains(pc)),
                        "{}{} {}: {:?} not in {:?}",
                        root,
                        quality,
                        position,
                        pcs,
                        tones
                    );
                    // Only the open C7 leaves out a tone (its fifth)
                    assert!(pcs.len() + 1 >= tones.len(), "{}{} {}", root, quality, position);
                }
            }
        }
    }

    #[test]
    fn test_standard_qualities_in_selection_order() {
        let table = ChordShapeTable::standard();
        assert_eq!(
            table.qualities(),
            ["M", "M7", "7", "6", "aug", "m", "mM7", "m7", "m6", "m7-5", "add9", "sus4", "7sus4", "dim7"]
        );
        assert_eq!(table.quality_index("M"), Some(0));
    }

    #[test]
    fn test_json_round_trip_and_lookup() {
        let json = r#"{
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "C": { "M": { "low": [0, 1, 0, 2, 3, -1], "high": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        let table = ChordShapeTable::from_json(json).unwrap();
        assert_eq!(table.quality_index("M"), Some(0));
        assert!(table.shape("C", "M").is_some());
        assert!(table.shape("D", "M").is_none());
    }

    #[test]
    fn test_malformed_fret_map_rejected() {
        let json = r#"{
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "C": { "M": { "low": [0, 1, 0, 2, 30, -1], "high": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        assert!(matches!(
            ChordShapeTable::from_json(json),
            Err(ChordError::MalformedFretMap { .. })
        ));

        let short = r#"{
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "C": { "M": { "low": [0, 1, 0], "high": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        assert!(matches!(ChordShapeTable::from_json(short), Err(ChordError::Parse(_))));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let json = r#"{
            "roots": ["C"],
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "C": { "M": { "low": [0, 1, 0, 2, 3, -1], "high": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        match ChordShapeTable::from_json(json) {
            Err(ChordError::Parse(msg)) => assert!(msg.contains("roots"), "{}", msg),
            other => panic!("expected a parse error, got {:?}", other),
        }

        let typo = r#"{
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "C": { "M": { "low": [0, 1, 0, 2, 3, -1], "hi": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        assert!(matches!(ChordShapeTable::from_json(typo), Err(ChordError::Parse(_))));
    }

    #[test]
    fn test_unknown_root_name_rejected() {
        let json = r#"{
            "qualities": ["M"],
            "open_strings": [16, 11, 7, 2, -3, -8],
            "shapes": { "H": { "M": { "low": [0, 1, 0, 2, 3, -1], "high": [3, 5, 5, 5, 3, -1] } } }
        }"#;
        assert_eq!(
            ChordShapeTable::from_json(json),
            Err(ChordError::UnknownRoot("H".to_string()))
        );
    }
}
