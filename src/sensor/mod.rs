//! Piezo sensor front end
//!
//! Provides:
//! - wraparound-safe millisecond ticks
//! - multiplexed analog sampling and the volts-to-intensity response
//! - velocity shaping
//! - per-channel hysteresis gates with after-touch and a stuck-channel watchdog

pub mod gate;
pub mod sampler;
pub mod ticks;
pub mod velocity;

pub use gate::{ChannelGate, GateError, GateEvent, GateState, GateTiming, VoltageGate};
pub use sampler::{MuxSampler, SensorBus, SensorResponse, MUX_CHANNELS};
pub use ticks::{ticks_add, ticks_diff, ticks_less, ManualTicks, SystemTicks, Tick, TickSource};
pub use velocity::{clamp_curve, shape, VelocityShaper};
