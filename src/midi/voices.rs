//! Sounding-note bookkeeping
//!
//! Every note event goes through [`VoiceManager::send`], which keeps one set of
//! sounding notes per MIDI channel. A note-on for a note that is already
//! sounding is preceded by a note-off for it, and a note-off is only sent for
//! a note that is sounding, so ons and offs always pair up.

use super::events::{MidiEvent, MidiOutput};

/// MIDI channels tracked
pub const MIDI_CHANNELS: usize = 16;

/// Set of note numbers 0..=127
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NoteSet(u128);

impl NoteSet {
    #[inline]
    fn contains(&self, note: u8) -> bool {
        note < 128 && self.0 & (1u128 << note) != 0
    }

    #[inline]
    fn insert(&mut self, note: u8) {
        if note < 128 {
            self.0 |= 1u128 << note;
        }
    }

    #[inline]
    fn remove(&mut self, note: u8) {
        if note < 128 {
            self.0 &= !(1u128 << note);
        }
    }

    fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..128).filter(move |n| self.contains(*n))
    }
}

/// Notes started by one physical input
#[derive(Debug, Clone, Default)]
struct Voice {
    notes: Vec<u8>,
    midi_channel: u8,
}

/// Tracks sounding notes per MIDI channel and which input started them
#[derive(Debug, Clone)]
pub struct VoiceManager {
    sounding: [NoteSet; MIDI_CHANNELS],
    voices: Vec<Voice>,
}

impl VoiceManager {
    /// Manager for `inputs` physical channels
    pub fn new(inputs: usize) -> Self {
        Self {
            sounding: [NoteSet::default(); MIDI_CHANNELS],
            voices: vec![Voice::default(); inputs],
        }
    }

    /// Forward one event, keeping the sounding sets consistent
    pub fn send<O: MidiOutput + ?Sized>(&mut self, event: MidiEvent, out: &mut O) {
        match event {
            MidiEvent::NoteOn { note, channel, .. } => {
                let set = &mut self.sounding[channel as usize & 0x0F];
                if set.contains(note) {
                    log::trace!("note {} already sounding on ch{}, re-triggering", note, channel + 1);
                    out.send(MidiEvent::note_off(note, channel));
                }
                set.insert(note);
                log::trace!("MIDI {}", event);
                out.send(event);
            }
            MidiEvent::NoteOff { note, channel } => {
                let set = &mut self.sounding[channel as usize & 0x0F];
                if !set.contains(note) {
                    log::trace!("note {} not sounding on ch{}, off skipped", note, channel + 1);
                    return;
                }
                set.remove(note);
                log::trace!("MIDI {}", event);
                out.send(event);
            }
            _ => {
                log::trace!("MIDI {}", event);
                out.send(event);
            }
        }
    }

    /// Start `note` for input `input`, releasing whatever that input held
    pub fn strike<O: MidiOutput + ?Sized>(
        &mut self,
        input: usize,
        note: u8,
        velocity: u8,
        midi_channel: u8,
        out: &mut O,
    ) {
        self.strike_notes(input, &[note], velocity, midi_channel, out);
    }

    /// Start several notes for one input (chord pad)
    pub fn strike_notes<O: MidiOutput + ?Sized>(
        &mut self,
        input: usize,
        notes: &[u8],
        velocity: u8,
        midi_channel: u8,
        out: &mut O,
    ) {
        if input >= self.voices.len() {
            log::warn!("strike on unknown input {}", input);
            return;
        }
        self.release(input, out);
        for &note in notes {
            self.send(MidiEvent::note_on(note, velocity, midi_channel), out);
        }
        let voice = &mut self.voices[input];
        voice.notes.clear();
        voice.notes.extend_from_slice(notes);
        voice.midi_channel = midi_channel;
    }

    /// Stop the notes input `input` started, if any
    pub fn release<O: MidiOutput + ?Sized>(&mut self, input: usize, out: &mut O) {
        let Some(voice) = self.voices.get_mut(input) else {
            return;
        };
        let channel = voice.midi_channel;
        let notes = std::mem::take(&mut voice.notes);
        for &note in &notes {
            self.send(MidiEvent::note_off(note, channel), out);
        }
        // Hand the buffer back so strikes don't reallocate
        let mut notes = notes;
        notes.clear();
        self.voices[input].notes = notes;
    }

    /// Note-off for every sounding note, channel by channel, then forget all inputs
    pub fn all_off<O: MidiOutput + ?Sized>(&mut self, out: &mut O) {
        for channel in 0..MIDI_CHANNELS {
            let set = self.sounding[channel];
            for note in set.iter() {
                let event = MidiEvent::note_off(note, channel as u8);
                log::trace!("MIDI {}", event);
                out.send(event);
            }
            self.sounding[channel] = NoteSet::default();
        }
        for voice in &mut self.voices {
            voice.notes.clear();
        }
    }

    pub fn is_sounding(&self, note: u8, midi_channel: u8) -> bool {
        self.sounding[midi_channel as usize & 0x0F].contains(note)
    }

    pub fn sounding_count(&self, midi_channel: u8) -> usize {
        self.sounding[midi_channel as usize & 0x0F].len()
    }

    /// Notes currently held by input `input`
    pub fn notes_of(&self, input: usize) -> &[u8] {
        self.voices.get(input).map(|v| v.notes.as_slice()).unwrap_or(&[])
    }
}
