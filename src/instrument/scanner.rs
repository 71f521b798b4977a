//! Scan thread
//!
//! Runs [`InstrumentController::scan`] at a fixed rate on its own thread. The
//! controller sits behind a mutex that is only held for one pass, so other
//! threads can change the voicing or knobs between passes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use super::controller::InstrumentController;
use crate::midi::MidiOutput;
use crate::sensor::{SensorBus, TickSource};

/// Shared between the scan thread and its owner
struct ScannerSharedState {
    should_stop: AtomicBool,
    passes: AtomicU64,
    errors: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Handle to a running scan thread
///
/// Dropping it stops and joins the thread.
pub struct Scanner {
    shared: Arc<ScannerSharedState>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl Scanner {
    /// Start scanning `controller` every `interval` (zero = yield only)
    pub fn spawn<B, C, O>(
        controller: Arc<Mutex<InstrumentController<B, C, O>>>,
        interval: Duration,
    ) -> Result<Self, String>
    where
        B: SensorBus + Send + 'static,
        C: TickSource + Send + 'static,
        O: MidiOutput + Send + 'static,
    {
        let shared = Arc::new(ScannerSharedState {
            should_stop: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_error: Mutex::new(None),
        });

        let shared_clone = Arc::clone(&shared);
        let thread_handle = thread::Builder::new()
            .name("pluckpad-scan".to_string())
            .spawn(move || scan_thread(controller, shared_clone, interval))
            .map_err(|e| format!("Failed to start scan thread: {}", e))?;

        log::info!("Scanner started ({} ms interval)", interval.as_millis());
        Ok(Self {
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    /// Stop the thread and wait for it; the pass in progress completes
    pub fn stop(&mut self) {
        self.shared.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Scan thread panicked");
            }
            log::info!("Scanner stopped after {} passes", self.passes());
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some() && !self.shared.should_stop.load(Ordering::SeqCst)
    }

    /// Completed scan passes
    pub fn passes(&self) -> u64 {
        self.shared.passes.load(Ordering::SeqCst)
    }

    /// Passes that reported an error
    pub fn errors(&self) -> u64 {
        self.shared.errors.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn scan_thread<B, C, O>(
    controller: Arc<Mutex<InstrumentController<B, C, O>>>,
    shared: Arc<ScannerSharedState>,
    interval: Duration,
) where
    B: SensorBus,
    C: TickSource,
    O: MidiOutput,
{
    while !shared.should_stop.load(Ordering::SeqCst) {
        let result = controller.lock().scan();
        shared.passes.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = result {
            shared.errors.fetch_add(1, Ordering::SeqCst);
            *shared.last_error.lock() = Some(e.to_string());
        }

        if interval.is_zero() {
            thread::yield_now();
        } else {
            thread::sleep(interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::ChordShapeTable;
    use crate::instrument::InstrumentConfig;
    use crate::midi::{MidiEvent, MidiEventQueue};
    use crate::sensor::SystemTicks;
    use std::time::Instant;

    /// Bus that holds channel 1 above the press threshold
    struct HeldBus {
        selected: usize,
        lines: [bool; 3],
    }

    impl SensorBus for HeldBus {
        fn set_select_line(&mut self, line: usize, high: bool) {
            self.lines[line] = high;
            self.selected = self
                .lines
                .iter()
                .enumerate()
                .fold(0, |acc, (i, h)| acc | ((*h as usize) << i));
        }

        fn read_adc(&mut self) -> u16 {
            if self.selected == 1 {
                40000
            } else {
                0
            }
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn test_scanner_runs_and_stops() {
        let queue = Arc::new(MidiEventQueue::new(64));
        let controller = InstrumentController::new(
            HeldBus {
                selected: 0,
                lines: [false; 3],
            },
            SystemTicks::new(),
            Arc::clone(&queue),
            InstrumentConfig::default(),
            ChordShapeTable::standard().clone(),
        )
        .unwrap();
        let controller = Arc::new(Mutex::new(controller));

        let mut scanner = Scanner::spawn(Arc::clone(&controller), Duration::ZERO).unwrap();
        assert!(wait_for(|| scanner.passes() >= 10));
        assert!(scanner.is_running());
        scanner.stop();
        assert!(!scanner.is_running());

        let passes = scanner.passes();
        thread::sleep(Duration::from_millis(5));
        assert_eq!(scanner.passes(), passes);
        assert_eq!(scanner.errors(), 0);

        // One held string: exactly one note-on, no matter how many passes
        let mut events = Vec::new();
        queue.drain_into(&mut events);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], MidiEvent::NoteOn { .. }));
    }

    #[test]
    fn test_scanner_records_errors() {
        let controller = InstrumentController::new(
            HeldBus {
                selected: 0,
                lines: [false; 3],
            },
            SystemTicks::new(),
            Vec::<MidiEvent>::new(),
            InstrumentConfig::default(),
            ChordShapeTable::standard().clone(),
        )
        .unwrap();
        let controller = Arc::new(Mutex::new(controller));
        // A quality index the table does not have
        controller.lock().set_chord(crate::chord::VoicingContext {
            quality: 99,
            ..Default::default()
        });

        let scanner = Scanner::spawn(Arc::clone(&controller), Duration::from_millis(1)).unwrap();
        assert!(wait_for(|| scanner.errors() >= 1));
        assert!(scanner
            .last_error()
            .is_some_and(|e| e.contains("quality")));
        drop(scanner);
    }
}
