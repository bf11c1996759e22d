//! Gyro-based optical flow prediction.
//!
//! Each inertial sample is turned into an image-plane rigid transform over
//! the interval since the previous sample:
//! - pan and tilt rates become a translation in pixels
//! - roll becomes a rotation about the sensor centre
//!
//! The flow at a pixel is the displacement that transform induces, divided
//! by the interval.

use nalgebra::{Vector2, Vector3};
use tracing::{info, warn};

use super::calibration::GyroCalibrator;
use super::sample::{GyroOffsets, InertialSample};
use super::state::ImuState;
use crate::config::ImuConfig;
use crate::event::FlowVector;
use crate::geometry::{ChipGeometry, Rigid2};

/// Outcome of feeding one inertial sample to the estimator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformUpdate {
    /// Discarded: leftover data from before a reset.
    Flushed,
    /// First sample after a reset; there is no interval yet.
    Initialized,
    /// Consumed by the running calibration.
    Calibrating,
    /// Calibration completed with these offsets.
    CalibrationFinished(GyroOffsets),
    /// A new transform is in effect.
    Applied,
}

impl TransformUpdate {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransformUpdate::Applied)
    }
}

/// Predicts per-pixel flow from camera rotation measured by the gyro.
pub struct ImuFlowEstimator {
    geometry: ChipGeometry,
    lens_focal_length_mm: f64,
    rad_per_pixel: f64,

    calibration_sample_count: u32,
    calibrator: GyroCalibrator,
    calibrating: bool,
    offsets: GyroOffsets,

    flush_count: u32,
    flush_counter: u32,
    initialized: bool,
    last_timestamp_us: i64,

    /// Latest raw rates (pan, tilt, roll) in deg/s.
    rates: Vector3<f64>,
    /// Transform over the last applied interval, and that interval in seconds.
    transform: Rigid2,
    dt_s: f64,
}

impl ImuFlowEstimator {
    pub fn new(geometry: ChipGeometry, config: &ImuConfig) -> Self {
        let mut estimator = Self {
            geometry,
            lens_focal_length_mm: config.lens_focal_length_mm,
            rad_per_pixel: geometry.rad_per_pixel(config.lens_focal_length_mm),
            calibration_sample_count: config.calibration_sample_count.max(1),
            calibrator: GyroCalibrator::new(),
            calibrating: false,
            offsets: config.offsets,
            flush_count: config.flush_count,
            flush_counter: config.flush_count,
            initialized: false,
            last_timestamp_us: 0,
            rates: Vector3::zeros(),
            transform: Rigid2::identity(),
            dt_s: 0.0,
        };
        estimator.reset();
        estimator
    }

    /// Forget timing and motion; keeps offsets and any running calibration.
    pub fn reset(&mut self) {
        self.flush_counter = self.flush_count;
        self.initialized = false;
        self.rates = Vector3::zeros();
        self.transform = Rigid2::identity();
        self.dt_s = 0.0;
        self.rad_per_pixel = self.geometry.rad_per_pixel(self.lens_focal_length_mm);
    }

    pub fn state(&self) -> ImuState {
        if self.calibrating {
            ImuState::Calibrating
        } else if self.initialized {
            ImuState::Tracking
        } else {
            ImuState::Uninitialized
        }
    }

    /// Compute the transform for the interval ending at this sample.
    pub fn update_transform(&mut self, sample: &InertialSample) -> TransformUpdate {
        if self.flush_counter > 0 {
            self.flush_counter -= 1;
            return TransformUpdate::Flushed;
        }

        let ts = sample.timestamp_us;
        if self.initialized && ts < self.last_timestamp_us {
            warn!(
                "IMU timestamp went backwards ({} < {}), restarting interval",
                ts, self.last_timestamp_us
            );
            self.initialized = false;
        }
        let dt_s = (ts - self.last_timestamp_us) as f64 * 1e-6;
        self.last_timestamp_us = ts;

        if !self.initialized {
            self.initialized = true;
            return TransformUpdate::Initialized;
        }

        self.rates = sample.gyro;

        if self.calibrating {
            self.calibrator.update(&sample.gyro);
            if self.calibrator.count() > u64::from(self.calibration_sample_count) {
                if let Some(offsets) = self.calibrator.means() {
                    self.offsets = offsets;
                }
                self.calibrating = false;
                info!(
                    "IMU calibration finished: {} samples averaged to (pan, tilt, roll) = ({:.3}, {:.3}, {:.3})",
                    self.calibrator.count(),
                    self.offsets.pan,
                    self.offsets.tilt,
                    self.offsets.roll
                );
                return TransformUpdate::CalibrationFinished(self.offsets);
            }
            return TransformUpdate::Calibrating;
        }

        let pan_px = (sample.pan() - self.offsets.pan).to_radians() * dt_s / self.rad_per_pixel;
        let tilt_px = (sample.tilt() - self.offsets.tilt).to_radians() * dt_s / self.rad_per_pixel;
        let roll_rad = (self.offsets.roll - sample.roll()).to_radians() * dt_s;

        self.transform = Rigid2::new(roll_rad, Vector2::new(pan_px, tilt_px));
        self.dt_s = dt_s;
        TransformUpdate::Applied
    }

    /// Flow induced at full-resolution pixel `(x, y)` by the current transform.
    ///
    /// Returns `None` while there is no interval to divide by, which covers
    /// the time before the first applied transform as well as two samples
    /// sharing a timestamp.
    pub fn calculate_flow(&self, x: f64, y: f64) -> Option<FlowVector> {
        if self.dt_s == 0.0 {
            return None;
        }
        let (cx, cy) = self.geometry.center();
        let n = Vector2::new(x - cx, y - cy);
        let moved = self.transform.apply(&n);
        Some(FlowVector::from((n - moved) / self.dt_s))
    }

    /// Begin averaging the next samples into new offsets.
    pub fn start_calibration(&mut self) {
        self.calibrator.reset();
        self.calibrating = true;
        info!(
            "IMU calibration started over {} samples",
            self.calibration_sample_count
        );
    }

    /// Zero the offsets.
    pub fn reset_calibration(&mut self) {
        self.offsets = GyroOffsets::zero();
        info!("IMU calibration erased");
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn is_calibration_set(&self) -> bool {
        self.offsets.is_set()
    }

    pub fn offsets(&self) -> GyroOffsets {
        self.offsets
    }

    pub fn set_offsets(&mut self, offsets: GyroOffsets) {
        self.offsets = offsets;
    }

    /// Samples accumulated so far and the number required.
    pub fn calibration_progress(&self) -> (u64, u32) {
        (self.calibrator.count(), self.calibration_sample_count)
    }

    pub fn set_calibration_sample_count(&mut self, count: u32) {
        self.calibration_sample_count = count.max(1);
    }

    pub fn lens_focal_length_mm(&self) -> f64 {
        self.lens_focal_length_mm
    }

    pub fn set_lens_focal_length_mm(&mut self, focal_length_mm: f64) {
        self.lens_focal_length_mm = focal_length_mm;
        self.rad_per_pixel = self.geometry.rad_per_pixel(focal_length_mm);
    }

    pub fn set_geometry(&mut self, geometry: ChipGeometry) {
        self.geometry = geometry;
        self.rad_per_pixel = geometry.rad_per_pixel(self.lens_focal_length_mm);
    }

    pub fn rad_per_pixel(&self) -> f64 {
        self.rad_per_pixel
    }

    pub fn rates(&self) -> Vector3<f64> {
        self.rates
    }

    pub fn transform(&self) -> &Rigid2 {
        &self.transform
    }

    pub fn dt_s(&self) -> f64 {
        self.dt_s
    }
}
