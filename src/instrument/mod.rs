//! The playable instrument: configuration, the scan pipeline and its thread

mod config;
mod controller;
mod scanner;

pub use config::{
    wrap_capotasto, InstrumentConfig, CAPO_LIMIT, PITCH_BEND_RANGE_MAX, VELOCITY_OFFSET_MAX,
};
pub use controller::{
    cc, InstrumentController, CHORD_PAD_CHANNEL, EFFECTOR_CHANNEL, STRING_CHANNELS,
};
pub use scanner::Scanner;
