//! MIDI event types, the output seam, and a queue for handing events between threads
//!
//! The controller only ever talks to a [`MidiOutput`]; wire framing lives here
//! so that every output (port, queue, capture buffer) sees the same events.
//! The queue uses a lock-free ring buffer with the producer side behind a
//! Mutex for the scan thread and the consumer side drained with try_lock.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};

use crate::chord::note_name;

/// Pitch bend centre (no bend)
pub const PITCH_BEND_CENTER: u16 = 8192;
/// Largest 14-bit pitch bend value
pub const PITCH_BEND_MAX: u16 = 16383;

/// MIDI events the instrument emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn {
        /// MIDI note number (0-127)
        note: u8,
        /// Velocity (1-127)
        velocity: u8,
        /// MIDI channel (0-15)
        channel: u8,
    },
    NoteOff {
        note: u8,
        channel: u8,
    },
    ControlChange {
        /// Controller number (0-127)
        controller: u8,
        /// Controller value (0-127)
        value: u8,
        channel: u8,
    },
    PitchBend {
        /// 14-bit pitch bend value (0-16383, center at 8192)
        value: u16,
        channel: u8,
    },
    ProgramChange {
        /// GM program (0-127)
        program: u8,
        channel: u8,
    },
}

impl MidiEvent {
    #[inline]
    pub fn note_on(note: u8, velocity: u8, channel: u8) -> Self {
        Self::NoteOn {
            note: note & 0x7F,
            velocity: velocity.clamp(1, 127),
            channel: channel & 0x0F,
        }
    }

    #[inline]
    pub fn note_off(note: u8, channel: u8) -> Self {
        Self::NoteOff {
            note: note & 0x7F,
            channel: channel & 0x0F,
        }
    }

    #[inline]
    pub fn control_change(controller: u8, value: u8, channel: u8) -> Self {
        Self::ControlChange {
            controller: controller & 0x7F,
            value: value.min(127),
            channel: channel & 0x0F,
        }
    }

    #[inline]
    pub fn pitch_bend(value: u16, channel: u8) -> Self {
        Self::PitchBend {
            value: value.min(PITCH_BEND_MAX),
            channel: channel & 0x0F,
        }
    }

    #[inline]
    pub fn program_change(program: u8, channel: u8) -> Self {
        Self::ProgramChange {
            program: program & 0x7F,
            channel: channel & 0x0F,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => channel,
        }
    }

    /// Raw wire bytes: status byte plus one or two data bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiEvent::NoteOn {
                note,
                velocity,
                channel,
            } => vec![0x90 | channel, note, velocity],
            MidiEvent::NoteOff { note, channel } => vec![0x80 | channel, note, 0],
            MidiEvent::ControlChange {
                controller,
                value,
                channel,
            } => vec![0xB0 | channel, controller, value],
            MidiEvent::PitchBend { value, channel } => {
                vec![0xE0 | channel, (value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
            }
            MidiEvent::ProgramChange { program, channel } => vec![0xC0 | channel, program],
        }
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiEvent::NoteOn {
                note,
                velocity,
                channel,
            } => write!(f, "ch{:<2} note on   {:<4} vel {}", channel + 1, note_name(note), velocity),
            MidiEvent::NoteOff { note, channel } => {
                write!(f, "ch{:<2} note off  {}", channel + 1, note_name(note))
            }
            MidiEvent::ControlChange {
                controller,
                value,
                channel,
            } => write!(f, "ch{:<2} cc {:<3}    = {}", channel + 1, controller, value),
            MidiEvent::PitchBend { value, channel } => {
                write!(f, "ch{:<2} bend      {}", channel + 1, value)
            }
            MidiEvent::ProgramChange { program, channel } => {
                write!(f, "ch{:<2} program   {}", channel + 1, program)
            }
        }
    }
}

/// Destination for MIDI events (port, queue, test capture)
pub trait MidiOutput {
    fn send(&mut self, event: MidiEvent);

    fn note_on(&mut self, note: u8, velocity: u8, channel: u8) {
        self.send(MidiEvent::note_on(note, velocity, channel));
    }

    fn note_off(&mut self, note: u8, channel: u8) {
        self.send(MidiEvent::note_off(note, channel));
    }

    fn control_change(&mut self, controller: u8, value: u8, channel: u8) {
        self.send(MidiEvent::control_change(controller, value, channel));
    }

    fn pitch_bend(&mut self, value: u16, channel: u8) {
        self.send(MidiEvent::pitch_bend(value, channel));
    }

    fn program_change(&mut self, program: u8, channel: u8) {
        self.send(MidiEvent::program_change(program, channel));
    }
}

/// Capture buffer
impl MidiOutput for Vec<MidiEvent> {
    fn send(&mut self, event: MidiEvent) {
        self.push(event);
    }
}

/// Thread-safe MIDI event queue using a lock-free ring buffer
///
/// The scan thread pushes, a sender thread drains.
pub struct MidiEventQueue {
    producer: Mutex<ringbuf::HeapProd<MidiEvent>>,
    /// Always taken with try_lock
    consumer: Mutex<ringbuf::HeapCons<MidiEvent>>,
    capacity: usize,
    dropped: AtomicUsize,
}

impl MidiEventQueue {
    pub fn new(capacity: usize) -> Self {
        let rb = HeapRb::new(capacity);
        let (producer, consumer) = rb.split();
        Self {
            producer: Mutex::new(producer),
            consumer: Mutex::new(consumer),
            capacity,
            dropped: AtomicUsize::new(0),
        }
    }

    /// Push an event; returns false (and counts a drop) if the queue is full
    #[inline]
    pub fn push(&self, event: MidiEvent) -> bool {
        if self.producer.lock().try_push(event).is_ok() {
            return true;
        }
        self.dropped.fetch_add(1, Ordering::Relaxed);
        log::warn!("MIDI queue full (capacity: {}), {} dropped", self.capacity, event);
        false
    }

    /// Drain all pending events into `buffer` (cleared first)
    ///
    /// Returns 0 if another consumer holds the lock; the events are picked up
    /// on the next call.
    #[inline]
    pub fn drain_into(&self, buffer: &mut Vec<MidiEvent>) -> usize {
        buffer.clear();
        if let Some(mut consumer) = self.consumer.try_lock() {
            while let Some(event) = consumer.try_pop() {
                buffer.push(event);
            }
        }
        buffer.len()
    }

    #[inline]
    pub fn pop(&self) -> Option<MidiEvent> {
        self.consumer.try_lock()?.try_pop()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.try_lock().map(|c| c.is_empty()).unwrap_or(true)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.consumer.try_lock().map(|c| c.occupied_len()).unwrap_or(0)
    }

    /// Events lost to a full queue since creation
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

// Producer and consumer halves are only reached through their mutexes
unsafe impl Send for MidiEventQueue {}
unsafe impl Sync for MidiEventQueue {}

impl MidiOutput for Arc<MidiEventQueue> {
    fn send(&mut self, event: MidiEvent) {
        self.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_mask_ranges() {
        assert_eq!(
            MidiEvent::note_on(200, 0, 17),
            MidiEvent::NoteOn {
                note: 72,
                velocity: 1,
                channel: 1
            }
        );
        assert_eq!(
            MidiEvent::pitch_bend(20000, 0),
            MidiEvent::PitchBend {
                value: PITCH_BEND_MAX,
                channel: 0
            }
        );
        assert_eq!(MidiEvent::program_change(1, 20).channel(), 4);
    }

    #[test]
    fn test_wire_bytes() {
        assert_eq!(MidiEvent::note_on(60, 100, 2).to_bytes(), vec![0x92, 60, 100]);
        assert_eq!(MidiEvent::note_off(60, 2).to_bytes(), vec![0x82, 60, 0]);
        assert_eq!(MidiEvent::control_change(93, 80, 0).to_bytes(), vec![0xB0, 93, 80]);
        assert_eq!(MidiEvent::program_change(25, 9).to_bytes(), vec![0xC9, 25]);
        // 8192 = centre: LSB 0, MSB 64
        assert_eq!(MidiEvent::pitch_bend(PITCH_BEND_CENTER, 0).to_bytes(), vec![0xE0, 0, 64]);
        assert_eq!(MidiEvent::pitch_bend(16383, 15).to_bytes(), vec![0xEF, 127, 127]);
    }

    #[test]
    fn test_display_uses_note_names() {
        let text = MidiEvent::note_on(60, 90, 0).to_string();
        assert!(text.contains("C4"));
        assert!(text.contains("90"));
    }

    #[test]
    fn test_capture_buffer_output() {
        let mut out: Vec<MidiEvent> = Vec::new();
        out.note_on(64, 100, 0);
        out.control_change(93, 80, 0);
        out.note_off(64, 0);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2], MidiEvent::note_off(64, 0));
    }

    #[test]
    fn test_midi_queue() {
        let mut queue = Arc::new(MidiEventQueue::new(16));

        queue.note_on(60, 100, 0);
        queue.note_on(64, 80, 0);
        queue.note_off(60, 0);
        assert_eq!(queue.len(), 3);

        let mut buffer = Vec::with_capacity(64);
        let count = queue.drain_into(&mut buffer);
        assert_eq!(count, 3);
        assert!(queue.is_empty());

        match buffer[0] {
            MidiEvent::NoteOn { note, velocity, .. } => {
                assert_eq!(note, 60);
                assert_eq!(velocity, 100);
            }
            _ => panic!("Expected NoteOn"),
        }
    }

    #[test]
    fn test_queue_overflow() {
        let queue = MidiEventQueue::new(4);

        for note in 60..64 {
            assert!(queue.push(MidiEvent::note_on(note, 100, 0)));
        }
        assert!(!queue.push(MidiEvent::note_on(64, 100, 0)));
        assert_eq!(queue.dropped(), 1);

        let mut buffer = Vec::with_capacity(8);
        assert_eq!(queue.drain_into(&mut buffer), 4);
        assert_eq!(queue.pop(), None);
    }
}
