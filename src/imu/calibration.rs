//! Gyro bias estimation by averaging stationary samples.

use nalgebra::Vector3;

use super::sample::GyroOffsets;
use crate::stats::Measurand;

/// One running accumulator per rotation axis.
#[derive(Debug, Clone, Default)]
pub struct GyroCalibrator {
    pan: Measurand,
    tilt: Measurand,
    roll: Measurand,
}

impl GyroCalibrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, gyro: &Vector3<f64>) {
        self.pan.update(gyro.x);
        self.tilt.update(gyro.y);
        self.roll.update(gyro.z);
    }

    /// Samples accumulated since the last reset.
    pub fn count(&self) -> u64 {
        self.pan.count()
    }

    /// Mean rates, or `None` before the first sample.
    pub fn means(&self) -> Option<GyroOffsets> {
        Some(GyroOffsets {
            pan: self.pan.mean()?,
            tilt: self.tilt.mean()?,
            roll: self.roll.mean()?,
        })
    }

    pub fn reset(&mut self) {
        self.pan.reset();
        self.tilt.reset();
        self.roll.reset();
    }
}
