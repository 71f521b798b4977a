//! Trace player
//!
//! Replays a recorded sensor trace through the real scan thread and prints
//! the MIDI it produces (or sends it to a port with the `midi-port` feature).
//!
//! Trace format:
//!
//! ```json
//! {
//!   "frame_ms": 5,
//!   "frames": [[0, 0, 0, 0, 0, 0, 0, 0], [2.1, 0, 0, 0, 0, 0, 0, 0]],
//!   "chords": [{ "frame": 40, "chord": { "root": "G" } }]
//! }
//! ```
//!
//! Each frame holds the volts seen on the eight multiplexer channels.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Deserialize;

use pluckpad::chord::{ChordBank, ChordSetEntry, ChordShapeTable, VoicingContext};
use pluckpad::instrument::{InstrumentConfig, InstrumentController, Scanner};
use pluckpad::midi::{MidiEvent, MidiEventQueue, MidiOutput};
use pluckpad::sensor::sampler::{ADC_FULL_SCALE, SELECT_LINES};
use pluckpad::sensor::{SensorBus, SystemTicks, MUX_CHANNELS};

const USAGE: &str = "Usage: pluckpad-player <trace.json> [--config cfg.json] [--shapes shapes.json] \
[--chord-set set.json] [--port name] [--log-file path]
       pluckpad-player --list-ports";

/// Pause between queue drains in the main thread
const DRAIN_INTERVAL: Duration = Duration::from_millis(2);

fn default_frame_ms() -> u64 {
    1
}

#[derive(Debug, Deserialize)]
struct ChordChange {
    frame: usize,
    chord: ChordSetEntry,
}

#[derive(Debug, Deserialize)]
struct Trace {
    #[serde(default = "default_frame_ms")]
    frame_ms: u64,
    frames: Vec<[f32; MUX_CHANNELS]>,
    #[serde(default)]
    chords: Vec<ChordChange>,
}

impl Trace {
    fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read trace {:?}: {}", path, e))?;
        let trace: Trace =
            serde_json::from_str(&text).map_err(|e| format!("Invalid trace {:?}: {}", path, e))?;
        if trace.frame_ms == 0 {
            return Err("frame_ms must be at least 1".to_string());
        }
        Ok(trace)
    }
}

/// Sensor bus playing back trace frames in real time
struct TraceBus {
    frames: Vec<[f32; MUX_CHANNELS]>,
    frame_ms: u64,
    reference_volts: f32,
    lines: [bool; SELECT_LINES],
    started: Option<Instant>,
    position: Arc<AtomicUsize>,
    finished: Arc<AtomicBool>,
}

impl TraceBus {
    fn selected(&self) -> usize {
        self.lines
            .iter()
            .enumerate()
            .fold(0, |acc, (i, high)| acc | ((*high as usize) << i))
    }

    fn current_frame(&mut self) -> Option<&[f32; MUX_CHANNELS]> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let index = (started.elapsed().as_millis() as u64 / self.frame_ms) as usize;
        self.position.store(index, Ordering::SeqCst);
        if index >= self.frames.len() {
            self.finished.store(true, Ordering::SeqCst);
            return None;
        }
        self.frames.get(index)
    }
}

impl SensorBus for TraceBus {
    fn set_select_line(&mut self, line: usize, high: bool) {
        if let Some(l) = self.lines.get_mut(line) {
            *l = high;
        }
    }

    fn read_adc(&mut self) -> u16 {
        let channel = self.selected();
        let reference = self.reference_volts;
        match self.current_frame() {
            Some(frame) => {
                let volts = frame[channel].clamp(0.0, reference);
                (volts / reference * ADC_FULL_SCALE).round() as u16
            }
            None => 0,
        }
    }
}

/// Prints events with their time since start
struct PrintOutput {
    started: Instant,
}

impl MidiOutput for PrintOutput {
    fn send(&mut self, event: MidiEvent) {
        println!("{:>8} ms  {}", self.started.elapsed().as_millis(), event);
    }
}

struct Options {
    trace: PathBuf,
    config: Option<PathBuf>,
    shapes: Option<PathBuf>,
    chord_set: Option<PathBuf>,
    port: Option<String>,
    log_file: Option<PathBuf>,
    list_ports: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut trace = None;
    let mut options = Options {
        trace: PathBuf::new(),
        config: None,
        shapes: None,
        chord_set: None,
        port: None,
        log_file: None,
        list_ports: false,
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "--config" => options.config = Some(PathBuf::from(value("--config")?)),
            "--shapes" => options.shapes = Some(PathBuf::from(value("--shapes")?)),
            "--chord-set" => options.chord_set = Some(PathBuf::from(value("--chord-set")?)),
            "--port" => options.port = Some(value("--port")?),
            "--log-file" => options.log_file = Some(PathBuf::from(value("--log-file")?)),
            "--list-ports" => options.list_ports = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            other if other.starts_with("--") => return Err(format!("Unknown option {}", other)),
            other => {
                if trace.replace(PathBuf::from(other)).is_some() {
                    return Err("Only one trace file can be given".to_string());
                }
            }
        }
    }

    match trace {
        Some(path) => options.trace = path,
        None if options.list_ports => {}
        None => return Err("Missing trace file".to_string()),
    }
    Ok(options)
}

#[cfg(feature = "midi-port")]
fn open_output(port: Option<&str>) -> Result<Box<dyn MidiOutput>, String> {
    match port {
        Some(name) => Ok(Box::new(pluckpad::midi::MidiPortOutput::connect(name)?)),
        None => Ok(Box::new(PrintOutput {
            started: Instant::now(),
        })),
    }
}

#[cfg(feature = "midi-port")]
fn run_list_ports() -> Result<(), String> {
    let ports = pluckpad::midi::list_ports()?;
    if ports.is_empty() {
        println!("No MIDI output ports");
    }
    for port in ports {
        println!("{:>3}  {}", port.index, port.name);
    }
    Ok(())
}

#[cfg(not(feature = "midi-port"))]
fn run_list_ports() -> Result<(), String> {
    Err("Built without the midi-port feature; no ports to list".to_string())
}

#[cfg(not(feature = "midi-port"))]
fn open_output(port: Option<&str>) -> Result<Box<dyn MidiOutput>, String> {
    match port {
        Some(_) => Err("Built without the midi-port feature; --port is unavailable".to_string()),
        None => Ok(Box::new(PrintOutput {
            started: Instant::now(),
        })),
    }
}

fn forward(queue: &MidiEventQueue, buffer: &mut Vec<MidiEvent>, sink: &mut dyn MidiOutput) -> usize {
    let count = queue.drain_into(buffer);
    for event in buffer.iter() {
        sink.send(*event);
    }
    count
}

fn run_player(options: &Options) -> Result<(), String> {
    let config = match &options.config {
        Some(path) => InstrumentConfig::load(path)?,
        None => InstrumentConfig::default(),
    };
    let shapes = match &options.shapes {
        Some(path) => ChordShapeTable::load(path)?,
        None => ChordShapeTable::standard().clone(),
    };

    let mut bank = ChordBank::new(&shapes);
    if let Some(path) = &options.chord_set {
        bank.load_chord_set(path, &shapes)?;
    }
    let start_chord = bank.select(0);

    let trace = Trace::load(&options.trace)?;
    let changes: Vec<(usize, VoicingContext)> = trace
        .chords
        .iter()
        .map(|c| {
            c.chord
                .to_context(&shapes)
                .map(|ctx| (c.frame, ctx))
                .map_err(|e| format!("Chord change at frame {}: {}", c.frame, e))
        })
        .collect::<Result<_, _>>()?;
    log::info!(
        "Trace {:?}: {} frames of {} ms, {} chord changes",
        options.trace,
        trace.frames.len(),
        trace.frame_ms,
        changes.len()
    );

    let position = Arc::new(AtomicUsize::new(0));
    let finished = Arc::new(AtomicBool::new(false));
    let bus = TraceBus {
        frames: trace.frames,
        frame_ms: trace.frame_ms,
        reference_volts: config.sensor.reference_volts,
        lines: [false; SELECT_LINES],
        started: None,
        position: Arc::clone(&position),
        finished: Arc::clone(&finished),
    };

    let mut sink = open_output(options.port.as_deref())?;
    let queue = Arc::new(MidiEventQueue::new(1024));
    let interval = Duration::from_millis(config.scan_interval_ms);

    let mut controller =
        InstrumentController::new(bus, SystemTicks::new(), Arc::clone(&queue), config, shapes)
            .map_err(|e| format!("Invalid configuration: {}", e))?;
    controller.setup();
    controller.set_chord(start_chord);
    let controller = Arc::new(Mutex::new(controller));

    let mut scanner = Scanner::spawn(Arc::clone(&controller), interval)?;
    let mut buffer = Vec::with_capacity(256);
    let mut pending = changes.into_iter().peekable();
    let mut forwarded = 0;

    while !finished.load(Ordering::SeqCst) {
        let frame = position.load(Ordering::SeqCst);
        while let Some((_, ctx)) = pending.next_if(|(at, _)| *at <= frame) {
            log::debug!("Frame {}: chord change", frame);
            controller.lock().set_chord(ctx);
        }
        forwarded += forward(&queue, &mut buffer, sink.as_mut());
        thread::sleep(DRAIN_INTERVAL);
    }

    scanner.stop();
    controller.lock().all_notes_off();
    forwarded += forward(&queue, &mut buffer, sink.as_mut());

    log::info!(
        "Done: {} passes, {} events, {} scan errors, {} dropped",
        scanner.passes(),
        forwarded,
        scanner.errors(),
        queue.dropped()
    );
    if let Some(err) = scanner.last_error() {
        log::warn!("Last scan error: {}", err);
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = pluckpad::logging::init_logging(options.log_file.as_deref()) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let result = if options.list_ports {
        run_list_ports()
    } else {
        run_player(&options)
    };

    match result {
        Ok(()) => {
            if let Some(path) = pluckpad::logging::log_file_path() {
                eprintln!("Log written to {}", path.display());
            }
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
