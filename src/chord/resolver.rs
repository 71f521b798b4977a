//! Chord voicing: voicing context + shape table -> concrete MIDI notes per string

use serde::{Deserialize, Serialize};

use super::shapes::{ChordShapeTable, Position, MUTED, ROOT_NAMES, STRING_COUNT};
use super::ChordError;

/// Everything needed to voice the current chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicingContext {
    /// Root pitch class (0 = C .. 11 = B)
    pub root: u8,
    /// Index into the table's quality list
    pub quality: usize,
    pub position: Position,
    /// Scale octave; string notes are placed `(octave + 1) * 12` above the tuning offsets
    pub octave: u8,
    /// Flat transposition applied by the caller after resolving (-12..=12)
    pub capotasto: i8,
    /// Pitch class of an on-chord bass ("C on D"), if any
    pub on_chord_bass: Option<u8>,
}

impl Default for VoicingContext {
    fn default() -> Self {
        Self {
            root: 0,
            quality: 0,
            position: Position::Low,
            octave: 4,
            capotasto: 0,
            on_chord_bass: None,
        }
    }
}

/// Notes of one voiced chord
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedChord {
    /// MIDI note per string, 1st string first; `None` = muted
    pub strings: [Option<u8>; STRING_COUNT],
    /// Extra on-chord bass note
    pub bass: Option<u8>,
}

impl ResolvedChord {
    /// Note of one string (0 = 1st string)
    pub fn string(&self, string: usize) -> Option<u8> {
        self.strings.get(string).copied().flatten()
    }

    /// Every sounding note, bass first, then from the 6th string up to the 1st
    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.bass
            .into_iter()
            .chain(self.strings.iter().rev().filter_map(|n| *n))
    }

    /// Shift every note by `semitones`; notes leaving 0..=127 are muted
    pub fn transposed(&self, semitones: i8) -> ResolvedChord {
        let shift = |note: Option<u8>| note.and_then(|n| to_midi(n as i16 + semitones as i16));
        let mut strings = self.strings;
        for note in strings.iter_mut() {
            *note = shift(*note);
        }
        ResolvedChord {
            strings,
            bass: shift(self.bass),
        }
    }
}

#[inline]
fn to_midi(note: i16) -> Option<u8> {
    if (0..=127).contains(&note) {
        Some(note as u8)
    } else {
        None
    }
}

/// Voice `ctx` against `table`
///
/// Strings are walked from the 6th (lowest) to the 1st. With an on-chord bass,
/// every string sounding the bass pitch class is muted and the bass is added
/// as a separate note. The bass drops an octave when the unmuted voicing
/// already had that exact note, so it sits below the string it replaced.
pub fn resolve(ctx: &VoicingContext, table: &ChordShapeTable) -> Result<ResolvedChord, ChordError> {
    let root = *ROOT_NAMES
        .get(ctx.root as usize)
        .ok_or(ChordError::InvalidRoot(ctx.root))?;
    let quality = table
        .quality_name(ctx.quality)
        .ok_or(ChordError::UnknownQuality(ctx.quality))?;
    let shape = table
        .shape(root, quality)
        .ok_or_else(|| ChordError::UnknownChord {
            root: root.to_string(),
            quality: quality.to_string(),
        })?;
    let bass_pc = match ctx.on_chord_bass {
        Some(pc) if pc >= 12 => return Err(ChordError::InvalidRoot(pc)),
        other => other,
    };

    let frets = shape.frets(ctx.position);
    let base = (ctx.octave as i16 + 1) * 12;
    let open = table.open_strings();

    let mut strings = [None; STRING_COUNT];
    let mut voiced = [None; STRING_COUNT];
    for string in (0..STRING_COUNT).rev() {
        let fret = frets[string];
        if fret == MUTED {
            continue;
        }
        let note = open[string] as i16 + fret as i16 + base;
        voiced[string] = Some(note);
        if bass_pc == Some(note.rem_euclid(12) as u8) {
            continue;
        }
        strings[string] = to_midi(note);
        if strings[string].is_none() {
            log::warn!(
                "{}{} string {} note {} outside MIDI range, muted",
                root,
                quality,
                string + 1,
                note
            );
        }
    }

    let bass = bass_pc.and_then(|pc| {
        let same_octave = pc as i16 + base;
        if voiced.contains(&Some(same_octave)) {
            to_midi(same_octave - 12)
        } else {
            to_midi(same_octave)
        }
    });

    Ok(ResolvedChord { strings, bass })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn c_major() -> VoicingContext {
        VoicingContext::default()
    }

    fn quality(name: &str) -> usize {
        ChordShapeTable::standard().quality_index(name).unwrap()
    }

    #[test]
    fn test_c_major_low() {
        let chord = resolve(&c_major(), ChordShapeTable::standard()).unwrap();
        assert_eq!(
            chord.strings,
            [Some(76), Some(72), Some(67), Some(64), Some(60), None]
        );
        assert_eq!(chord.bass, None);
        assert_eq!(chord.notes().collect::<Vec<_>>(), vec![60, 64, 67, 72, 76]);
    }

    #[test]
    fn test_octave_moves_register() {
        let ctx = VoicingContext {
            octave: 3,
            ..c_major()
        };
        let chord = resolve(&ctx, ChordShapeTable::standard()).unwrap();
        assert_eq!(chord.string(4), Some(48));
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let ctx = VoicingContext {
            root: 9,
            quality: quality("m7"),
            position: Position::High,
            ..c_major()
        };
        let table = ChordShapeTable::standard();
        assert_eq!(resolve(&ctx, table).unwrap(), resolve(&ctx, table).unwrap());
    }

    #[test]
    fn test_on_chord_bass_added_when_absent() {
        // C on D: no string plays D, so nothing is muted and one D is added
        let ctx = VoicingContext {
            on_chord_bass: Some(2),
            ..c_major()
        };
        let chord = resolve(&ctx, ChordShapeTable::standard()).unwrap();
        assert_eq!(
            chord.strings,
            [Some(76), Some(72), Some(67), Some(64), Some(60), None]
        );
        assert_eq!(chord.bass, Some(62));
        let ds: Vec<u8> = chord.notes().filter(|n| n % 12 == 2).collect();
        assert_eq!(ds, vec![62]);
    }

    #[test]
    fn test_on_chord_bass_mutes_matching_strings() {
        // G on D: the open 4th string plays D and gets muted
        let ctx = VoicingContext {
            root: 7,
            on_chord_bass: Some(2),
            ..c_major()
        };
        let chord = resolve(&ctx, ChordShapeTable::standard()).unwrap();
        assert!(chord.strings.iter().flatten().all(|n| n % 12 != 2));
        assert_eq!(chord.string(3), None);
        // D4 was the muted string's note, so the bass drops to D3
        assert_eq!(chord.bass, Some(50));
        assert_eq!(chord.notes().filter(|n| n % 12 == 2).count(), 1);
    }

    #[test]
    fn test_bass_replaces_root_strings() {
        // C on C: both C strings are muted; C4 was on the 5th string, so the bass is C3
        let ctx = VoicingContext {
            on_chord_bass: Some(0),
            ..c_major()
        };
        let chord = resolve(&ctx, ChordShapeTable::standard()).unwrap();
        assert_eq!(chord.string(1), None);
        assert_eq!(chord.string(4), None);
        assert_eq!(chord.bass, Some(48));
        assert_eq!(chord.notes().collect::<Vec<_>>(), vec![48, 64, 67, 76]);
    }

    #[test]
    fn test_bass_stays_in_octave_without_collision() {
        // A minor on G: no string of the open voicing plays G4
        let ctx = VoicingContext {
            root: 9,
            quality: quality("m"),
            on_chord_bass: Some(7),
            ..c_major()
        };
        let chord = resolve(&ctx, ChordShapeTable::standard()).unwrap();
        assert_eq!(chord.bass, Some(67));

        let mut lowered = 0;
        let table = ChordShapeTable::standard();
        for root in 0..12u8 {
            for bass in 0..12u8 {
                let ctx = VoicingContext {
                    root,
                    on_chord_bass: Some(bass),
                    ..c_major()
                };
                let chord = resolve(&ctx, table).unwrap();
                if chord.bass.is_some_and(|b| (b as i16) < bass as i16 + 60) {
                    lowered += 1;
                }
            }
        }
        assert!(lowered > 0);
    }

    #[test]
    fn test_bass_out_of_range_rejected() {
        let ctx = VoicingContext {
            on_chord_bass: Some(12),
            ..c_major()
        };
        assert_eq!(
            resolve(&ctx, ChordShapeTable::standard()),
            Err(ChordError::InvalidRoot(12))
        );
    }

    #[test]
    fn test_unknown_chord_is_an_error() {
        let mut shapes = BTreeMap::new();
        shapes.insert("C".to_string(), BTreeMap::new());
        let table = ChordShapeTable::new(vec!["M".to_string()], [16, 11, 7, 2, -3, -8], shapes).unwrap();

        assert_eq!(
            resolve(&c_major(), &table),
            Err(ChordError::UnknownChord {
                root: "C".to_string(),
                quality: "M".to_string()
            })
        );
        let bad_quality = VoicingContext {
            quality: 5,
            ..c_major()
        };
        assert_eq!(resolve(&bad_quality, &table), Err(ChordError::UnknownQuality(5)));
        let bad_root = VoicingContext {
            root: 12,
            ..c_major()
        };
        assert_eq!(resolve(&bad_root, &table), Err(ChordError::InvalidRoot(12)));
    }

    #[test]
    fn test_transposed_applies_capo_and_mutes_out_of_range() {
        let chord = resolve(&c_major(), ChordShapeTable::standard()).unwrap();
        let capo = chord.transposed(2);
        assert_eq!(capo.string(4), Some(62));
        assert_eq!(capo.string(5), None);

        let high = ResolvedChord {
            strings: [Some(127), Some(60), None, None, None, None],
            bass: Some(126),
        };
        let up = high.transposed(3);
        assert_eq!(up.string(0), None);
        assert_eq!(up.string(1), Some(63));
        assert_eq!(up.bass, None);
    }
}
