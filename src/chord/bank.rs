//! Chord presets on buttons and chord progressions ("music mode")
//!
//! Both are fed from the same chord-set JSON format:
//!
//! ```json
//! { "name": "Pop", "chords": [ { "root": "C", "quality": "M", "position": "low", "bass": "D", "octave": 4 } ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::resolver::VoicingContext;
use super::shapes::{root_index, ChordShapeTable, Position};
use super::ChordError;

/// Chord buttons per bank
pub const BANK_BUTTONS: usize = 6;

/// Presets across both banks
pub const PRESET_COUNT: usize = BANK_BUTTONS * 2;

/// Highest scale octave a preset may use
const MAX_OCTAVE: u8 = 8;

fn default_quality() -> String {
    "M".to_string()
}

fn default_octave() -> u8 {
    4
}

/// One chord of a chord-set file, by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSetEntry {
    pub root: String,
    #[serde(default = "default_quality")]
    pub quality: String,
    #[serde(default)]
    pub position: Position,
    /// On-chord bass root name
    #[serde(default)]
    pub bass: Option<String>,
    #[serde(default = "default_octave")]
    pub octave: u8,
}

impl ChordSetEntry {
    /// Turn names into indices of `table`
    pub fn to_context(&self, table: &ChordShapeTable) -> Result<VoicingContext, ChordError> {
        let root = root_index(&self.root).ok_or_else(|| ChordError::UnknownRoot(self.root.clone()))?;
        let quality = table
            .quality_index(&self.quality)
            .ok_or_else(|| ChordError::UnknownQualityName(self.quality.clone()))?;
        let on_chord_bass = match &self.bass {
            Some(name) => Some(root_index(name).ok_or_else(|| ChordError::UnknownRoot(name.clone()))?),
            None => None,
        };

        Ok(VoicingContext {
            root,
            quality,
            position: self.position,
            octave: self.octave.min(MAX_OCTAVE),
            capotasto: 0,
            on_chord_bass,
        })
    }
}

/// Named list of chords
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSet {
    pub name: String,
    pub chords: Vec<ChordSetEntry>,
}

impl ChordSet {
    pub fn from_json(text: &str) -> Result<Self, ChordError> {
        serde_json::from_str(text).map_err(|e| ChordError::Parse(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read chord set {:?}: {}", path, e))?;
        Self::from_json(&text).map_err(|e| format!("Invalid chord set {:?}: {}", path, e))
    }

    /// Resolve every entry; fails on the first unknown name
    pub fn contexts(&self, table: &ChordShapeTable) -> Result<Vec<VoicingContext>, ChordError> {
        self.chords.iter().map(|entry| entry.to_context(table)).collect()
    }
}

/// Twelve chord presets on six buttons, switched between two banks
#[derive(Debug, Clone)]
pub struct ChordBank {
    name: String,
    presets: [VoicingContext; PRESET_COUNT],
    bank: usize,
    selected: usize,
}

impl ChordBank {
    /// Default presets: C G Am Em F Dm, low position in bank 0, high in bank 1
    pub fn new(table: &ChordShapeTable) -> Self {
        let major = table.quality_index("M").unwrap_or(0);
        let minor = table.quality_index("m").unwrap_or(0);
        let chords = [(0, major), (7, major), (9, minor), (4, minor), (5, major), (2, minor)];

        let mut presets = [VoicingContext::default(); PRESET_COUNT];
        for (i, preset) in presets.iter_mut().enumerate() {
            let (root, quality) = chords[i % BANK_BUTTONS];
            preset.root = root;
            preset.quality = quality;
            preset.position = if i < BANK_BUTTONS {
                Position::Low
            } else {
                Position::High
            };
        }

        Self {
            name: "Default".to_string(),
            presets,
            bank: 0,
            selected: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bank(&self) -> usize {
        self.bank
    }

    pub fn set_bank(&mut self, bank: usize) {
        self.bank = bank % 2;
    }

    /// Switch to the other bank
    pub fn next_bank(&mut self) -> usize {
        self.set_bank(self.bank + 1);
        self.bank
    }

    /// Preset under `button` (0..6) in the current bank
    pub fn select(&mut self, button: usize) -> VoicingContext {
        self.selected = self.bank * BANK_BUTTONS + button % BANK_BUTTONS;
        self.presets[self.selected]
    }

    /// Index of the last selected preset (0..12)
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn preset(&self, index: usize) -> Option<&VoicingContext> {
        self.presets.get(index)
    }

    pub fn presets(&self) -> &[VoicingContext; PRESET_COUNT] {
        &self.presets
    }

    /// Overwrite one preset; the index wraps
    pub fn set_preset(&mut self, index: usize, mut ctx: VoicingContext) {
        ctx.root %= 12;
        ctx.octave = ctx.octave.min(MAX_OCTAVE);
        ctx.on_chord_bass = ctx.on_chord_bass.map(|b| b % 12);
        self.presets[index % PRESET_COUNT] = ctx;
    }

    /// Replace presets from a chord set, starting at preset 0
    ///
    /// Every entry is checked before anything changes, so a bad set leaves the
    /// bank untouched. Entries past the twelfth are ignored.
    pub fn apply_chord_set(&mut self, set: &ChordSet, table: &ChordShapeTable) -> Result<(), ChordError> {
        let contexts = set.contexts(table)?;
        if contexts.len() > PRESET_COUNT {
            log::warn!(
                "Chord set '{}' has {} chords, only the first {} are used",
                set.name,
                contexts.len(),
                PRESET_COUNT
            );
        }
        for (i, ctx) in contexts.into_iter().take(PRESET_COUNT).enumerate() {
            self.set_preset(i, ctx);
        }
        self.name = set.name.clone();
        log::info!("Chord set '{}' loaded", set.name);
        Ok(())
    }

    /// Load and apply a chord-set file
    pub fn load_chord_set<P: AsRef<Path>>(&mut self, path: P, table: &ChordShapeTable) -> Result<(), String> {
        let path = path.as_ref();
        let set = ChordSet::load(path)?;
        self.apply_chord_set(&set, table)
            .map_err(|e| format!("Chord set {:?}: {}", path, e))
    }
}

/// Ordered chords of a song with a cursor
///
/// The cursor may sit one past the last chord, on the end-of-song marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Progression {
    name: String,
    chords: Vec<VoicingContext>,
    cursor: usize,
}

impl Progression {
    pub fn new(name: impl Into<String>, chords: Vec<VoicingContext>) -> Self {
        Self {
            name: name.into(),
            chords,
            cursor: 0,
        }
    }

    pub fn from_chord_set(set: &ChordSet, table: &ChordShapeTable) -> Result<Self, ChordError> {
        Ok(Self::new(set.name.clone(), set.contexts(table)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    /// Cursor index, `None` on the end marker
    pub fn position(&self) -> Option<usize> {
        (self.cursor < self.chords.len()).then_some(self.cursor)
    }

    pub fn is_at_end(&self) -> bool {
        self.cursor >= self.chords.len()
    }

    /// Chord under the cursor, `None` at the end of the song
    pub fn current(&self) -> Option<VoicingContext> {
        self.chords.get(self.cursor).copied()
    }

    /// Step forward; past the last chord the cursor parks on the end marker
    pub fn advance(&mut self) -> Option<VoicingContext> {
        if self.cursor < self.chords.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Step back; from the first chord it wraps to the last
    pub fn retreat(&mut self) -> Option<VoicingContext> {
        if self.chords.is_empty() {
            return None;
        }
        self.cursor = if self.cursor == 0 {
            self.chords.len() - 1
        } else {
            self.cursor.min(self.chords.len()) - 1
        };
        self.current()
    }

    pub fn first(&mut self) -> Option<VoicingContext> {
        self.cursor = 0;
        self.current()
    }

    pub fn last(&mut self) -> Option<VoicingContext> {
        self.cursor = self.chords.len().saturating_sub(1);
        self.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> &'static ChordShapeTable {
        ChordShapeTable::standard()
    }

    fn song() -> ChordSet {
        ChordSet::from_json(
            r#"{
                "name": "Four chords",
                "chords": [
                    { "root": "C" },
                    { "root": "G", "position": "high" },
                    { "root": "A", "quality": "m", "octave": 3 },
                    { "root": "F", "bass": "G" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_bank_layout() {
        let mut bank = ChordBank::new(table());
        let minor = table().quality_index("m").unwrap();

        let am = bank.select(2);
        assert_eq!((am.root, am.quality, am.position), (9, minor, Position::Low));
        assert_eq!(bank.selected(), 2);

        assert_eq!(bank.next_bank(), 1);
        let am_high = bank.select(2);
        assert_eq!((am_high.root, am_high.position), (9, Position::High));
        assert_eq!(bank.selected(), 8);

        assert_eq!(bank.next_bank(), 0);
        // Buttons wrap within the bank
        assert_eq!(bank.select(6).root, 0);
    }

    #[test]
    fn test_set_preset_wraps_values() {
        let mut bank = ChordBank::new(table());
        bank.set_preset(
            13,
            VoicingContext {
                root: 14,
                octave: 12,
                on_chord_bass: Some(23),
                ..VoicingContext::default()
            },
        );
        let ctx = bank.preset(1).unwrap();
        assert_eq!(ctx.root, 2);
        assert_eq!(ctx.octave, 8);
        assert_eq!(ctx.on_chord_bass, Some(11));
    }

    #[test]
    fn test_apply_chord_set() {
        let mut bank = ChordBank::new(table());
        bank.apply_chord_set(&song(), table()).unwrap();
        assert_eq!(bank.name(), "Four chords");
        assert_eq!(bank.preset(1).unwrap().position, Position::High);
        assert_eq!(bank.preset(2).unwrap().octave, 3);
        assert_eq!(bank.preset(3).unwrap().on_chord_bass, Some(7));
        // Untouched presets keep their defaults
        assert_eq!(bank.preset(4).unwrap().root, 5);
    }

    #[test]
    fn test_unknown_names_leave_bank_untouched() {
        let mut bank = ChordBank::new(table());
        let bad = ChordSet::from_json(
            r#"{ "name": "Bad", "chords": [ { "root": "C" }, { "root": "D", "quality": "add13" } ] }"#,
        )
        .unwrap();
        assert_eq!(
            bank.apply_chord_set(&bad, table()),
            Err(ChordError::UnknownQualityName("add13".to_string()))
        );
        assert_eq!(bank.name(), "Default");

        let bad_root = ChordSet::from_json(r#"{ "name": "Bad", "chords": [ { "root": "X" } ] }"#).unwrap();
        assert_eq!(
            bank.apply_chord_set(&bad_root, table()),
            Err(ChordError::UnknownRoot("X".to_string()))
        );
    }

    #[test]
    fn test_load_chord_set_file() {
        let path = std::env::temp_dir().join(format!("pluckpad_chord_set_{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "name": "File", "chords": [ { "root": "E", "quality": "m" } ] }"#).unwrap();

        let mut bank = ChordBank::new(table());
        bank.load_chord_set(&path, table()).unwrap();
        assert_eq!(bank.name(), "File");
        assert_eq!(bank.preset(0).unwrap().root, 4);

        let _ = std::fs::remove_file(&path);
        assert!(bank.load_chord_set(&path, table()).is_err());
    }

    #[test]
    fn test_progression_walk() {
        let mut song = Progression::from_chord_set(&song(), table()).unwrap();
        assert_eq!(song.len(), 4);
        assert_eq!(song.current().unwrap().root, 0);

        assert_eq!(song.advance().unwrap().root, 7);
        assert_eq!(song.last().unwrap().root, 5);
        assert_eq!(song.position(), Some(3));

        // Past the last chord: end marker, and it stays there
        assert_eq!(song.advance(), None);
        assert!(song.is_at_end());
        assert_eq!(song.advance(), None);
        assert_eq!(song.position(), None);

        // Back from the end lands on the last chord
        assert_eq!(song.retreat().unwrap().root, 5);
        assert_eq!(song.first().unwrap().root, 0);
        // Back from the first chord wraps
        assert_eq!(song.retreat().unwrap().root, 5);
    }

    #[test]
    fn test_empty_progression() {
        let mut song = Progression::new("Nothing", Vec::new());
        assert!(song.is_empty());
        assert!(song.is_at_end());
        assert_eq!(song.current(), None);
        assert_eq!(song.advance(), None);
        assert_eq!(song.retreat(), None);
        assert_eq!(song.first(), None);
        assert_eq!(song.last(), None);
    }

    #[test]
    fn test_demo_chord_set_loads() {
        let set = ChordSet::from_json(include_str!("../../demos/pop_chord_set.json")).unwrap();
        let mut bank = ChordBank::new(table());
        bank.apply_chord_set(&set, table()).unwrap();
        assert_eq!(bank.name(), "Pop in C");
        // G/B
        assert_eq!(bank.preset(1).map(|p| p.on_chord_bass), Some(Some(11)));
    }
}
