//! Whole-sensor motion estimated from the per-event flow of one packet.

use std::fmt;

use nalgebra::Vector2;

use super::measurand::Measurand;
use crate::event::FlowVector;

/// Global motion measured over a single packet.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalMotionSample {
    /// Mean flow in px/s.
    pub vx: f64,
    pub vy: f64,
    /// Mean angular velocity about the sensor centre in rad/s, counter-clockwise positive.
    pub rotation: f64,
    /// Mean divergence from the sensor centre in 1/s.
    pub expansion: f64,
    pub events: u64,
}

/// Accumulates global translation, rotation and expansion.
///
/// Rotation and expansion are taken relative to the sensor centre and skip
/// events closer than one pixel to it.
#[derive(Debug, Clone)]
pub struct GlobalMotion {
    center: Vector2<f64>,

    sum_v: Vector2<f64>,
    sum_rotation: f64,
    sum_expansion: f64,
    translation_count: u64,
    radial_count: u64,

    pub mean_vx: Measurand,
    pub mean_vy: Measurand,
    pub rotation: Measurand,
    pub expansion: Measurand,
    last: Option<GlobalMotionSample>,
}

impl GlobalMotion {
    pub fn new(center: (f64, f64)) -> Self {
        Self {
            center: Vector2::new(center.0, center.1),
            sum_v: Vector2::zeros(),
            sum_rotation: 0.0,
            sum_expansion: 0.0,
            translation_count: 0,
            radial_count: 0,
            mean_vx: Measurand::new(),
            mean_vy: Measurand::new(),
            rotation: Measurand::new(),
            expansion: Measurand::new(),
            last: None,
        }
    }

    pub fn set_center(&mut self, center: (f64, f64)) {
        self.center = Vector2::new(center.0, center.1);
    }

    /// Add one event at full-resolution pixel `(x, y)`.
    pub fn update(&mut self, x: f64, y: f64, flow: FlowVector) {
        if !flow.is_finite() || flow.is_zero() {
            return;
        }
        let v = flow.as_vector();
        self.sum_v += v;
        self.translation_count += 1;

        let r = Vector2::new(x, y) - self.center;
        let r2 = r.norm_squared();
        if r2 < 1.0 {
            return;
        }
        self.sum_rotation += r.perp(&v) / r2;
        self.sum_expansion += r.dot(&v) / r2;
        self.radial_count += 1;
    }

    /// Close the current packet and fold its means into the running totals.
    pub fn finish_packet(&mut self) -> Option<GlobalMotionSample> {
        if self.translation_count == 0 {
            return None;
        }
        let n = self.translation_count as f64;
        let (rotation, expansion) = if self.radial_count > 0 {
            let m = self.radial_count as f64;
            (self.sum_rotation / m, self.sum_expansion / m)
        } else {
            (0.0, 0.0)
        };
        let sample = GlobalMotionSample {
            vx: self.sum_v.x / n,
            vy: self.sum_v.y / n,
            rotation,
            expansion,
            events: self.translation_count,
        };

        self.mean_vx.update(sample.vx);
        self.mean_vy.update(sample.vy);
        if self.radial_count > 0 {
            self.rotation.update(rotation);
            self.expansion.update(expansion);
        }
        self.clear_packet();
        self.last = Some(sample);
        Some(sample)
    }

    pub fn last_packet(&self) -> Option<GlobalMotionSample> {
        self.last
    }

    pub fn reset(&mut self) {
        self.clear_packet();
        self.mean_vx.reset();
        self.mean_vy.reset();
        self.rotation.reset();
        self.expansion.reset();
        self.last = None;
    }

    fn clear_packet(&mut self) {
        self.sum_v = Vector2::zeros();
        self.sum_rotation = 0.0;
        self.sum_expansion = 0.0;
        self.translation_count = 0;
        self.radial_count = 0;
    }
}

impl fmt::Display for GlobalMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Global vx [px/s]: {}", self.mean_vx)?;
        writeln!(f, "Global vy [px/s]: {}", self.mean_vy)?;
        writeln!(f, "Global rotation [rad/s]: {}", self.rotation)?;
        write!(f, "Global expansion [1/s]: {}", self.expansion)
    }
}
