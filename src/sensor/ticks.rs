//! Millisecond tick counter with wraparound-safe arithmetic
//!
//! The counter runs modulo 2^29 ms (about 6.2 days), so it cycles while the
//! device is powered. Ticks are never ordered directly: every comparison goes
//! through [`ticks_diff`], which is valid while the real distance between the
//! two values stays under 2^28 ms.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counter modulus
pub const TICKS_PERIOD: u32 = 1 << 29;
/// Largest representable tick value
pub const TICKS_MAX: u32 = TICKS_PERIOD - 1;
/// Half the modulus; the largest distance `ticks_diff` can report correctly
pub const TICKS_HALF_PERIOD: u32 = TICKS_PERIOD / 2;

/// A point on the wrapping millisecond counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Tick(u32);

impl Tick {
    /// Build a tick from a raw millisecond count (reduced modulo the period)
    #[inline]
    pub const fn from_millis(ms: u32) -> Self {
        Self(ms & TICKS_MAX)
    }

    #[inline]
    pub const fn as_millis(self) -> u32 {
        self.0
    }
}

/// Add a signed delta, wrapping at 2^29 ms
#[inline]
pub fn ticks_add(ticks: Tick, delta: i32) -> Tick {
    let sum = (ticks.0 as i64 + delta as i64).rem_euclid(TICKS_PERIOD as i64);
    Tick(sum as u32)
}

/// Signed distance `a - b`, assuming the two ticks are within 2^28 ms
#[inline]
pub fn ticks_diff(a: Tick, b: Tick) -> i32 {
    let diff = a.0.wrapping_sub(b.0) & TICKS_MAX;
    ((diff + TICKS_HALF_PERIOD) & TICKS_MAX) as i32 - TICKS_HALF_PERIOD as i32
}

/// True when `a` is earlier than `b`
#[inline]
pub fn ticks_less(a: Tick, b: Tick) -> bool {
    ticks_diff(a, b) < 0
}

/// Source of the free-running millisecond counter
pub trait TickSource {
    fn now(&self) -> Tick;
}

/// Host clock: milliseconds since construction
#[derive(Debug, Clone)]
pub struct SystemTicks {
    boot: Instant,
}

impl SystemTicks {
    pub fn new() -> Self {
        Self { boot: Instant::now() }
    }
}

impl Default for SystemTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemTicks {
    fn now(&self) -> Tick {
        let elapsed = self.boot.elapsed().as_millis() % TICKS_PERIOD as u128;
        Tick(elapsed as u32)
    }
}

/// Externally driven counter, shared between clones
///
/// Time only moves when told to, in exact steps.
#[derive(Debug, Clone, Default)]
pub struct ManualTicks {
    ms: Arc<AtomicU32>,
}

impl ManualTicks {
    pub fn new(start: Tick) -> Self {
        Self {
            ms: Arc::new(AtomicU32::new(start.as_millis())),
        }
    }

    pub fn set(&self, tick: Tick) {
        self.ms.store(tick.as_millis(), Ordering::SeqCst);
    }

    /// Move the counter forward by `delta` milliseconds (wrapping)
    pub fn advance(&self, delta: u32) {
        let current = Tick(self.ms.load(Ordering::SeqCst));
        let next = ticks_add(current, (delta & TICKS_MAX) as i32);
        self.ms.store(next.as_millis(), Ordering::SeqCst);
    }
}

impl TickSource for ManualTicks {
    fn now(&self) -> Tick {
        Tick(self.ms.load(Ordering::SeqCst))
    }
}
