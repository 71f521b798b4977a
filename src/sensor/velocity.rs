//! Strike intensity to MIDI velocity

/// Smallest accepted curve exponent
pub const CURVE_MIN: f32 = 1.5;
/// Largest accepted curve exponent
pub const CURVE_MAX: f32 = 4.0;
/// Curve used when none is configured
pub const CURVE_DEFAULT: f32 = 2.7;

/// Intensity that maps to full velocity when no explicit range is given
pub const INTENSITY_CEILING: f32 = 5000.0;

/// Bring a curve exponent into range; anything outside falls back to the minimum
#[inline]
pub fn clamp_curve(curve: f32) -> f32 {
    if curve.is_finite() && (CURVE_MIN..=CURVE_MAX).contains(&curve) {
        curve
    } else {
        CURVE_MIN
    }
}

/// Map raw intensity (0..=5000) to a velocity in 1..=127
pub fn shape(raw: f32, curve_exponent: f32) -> u8 {
    shape_in_range(raw, 0.0, INTENSITY_CEILING, clamp_curve(curve_exponent))
}

/// Power-law mapping of `raw` within `floor..=ceiling`
///
/// The normalised intensity is raised to `1 / curve`, so a steeper curve
/// lifts light strikes. Output is monotonic in `raw`.
fn shape_in_range(raw: f32, floor: f32, ceiling: f32, curve: f32) -> u8 {
    let span = (ceiling - floor).max(f32::EPSILON);
    let t = (raw - floor) / span;
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
    let velocity = 1.0 + 126.0 * t.powf(1.0 / curve);
    (velocity.round() as u8).clamp(1, 127)
}

/// Velocity mapping bound to one input's working range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityShaper {
    curve: f32,
    ceiling: f32,
}

impl VelocityShaper {
    pub fn new(curve: f32, ceiling: f32) -> Self {
        Self {
            curve: clamp_curve(curve),
            ceiling,
        }
    }

    pub fn curve(&self) -> f32 {
        self.curve
    }

    pub fn set_curve(&mut self, curve: f32) {
        self.curve = clamp_curve(curve);
    }

    /// Velocity for a strike that crossed `press_threshold` with `intensity`
    ///
    /// The range starts at the press threshold so the weakest strike that
    /// opens the gate gives velocity 1.
    pub fn velocity(&self, intensity: f32, press_threshold: f32) -> u8 {
        let floor = press_threshold.min(self.ceiling);
        shape_in_range(intensity, floor, self.ceiling, self.curve)
    }
}

impl Default for VelocityShaper {
    fn default() -> Self {
        Self::new(CURVE_DEFAULT, INTENSITY_CEILING)
    }
}
