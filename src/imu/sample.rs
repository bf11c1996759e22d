use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Single gyroscope measurement, interleaved with events in the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialSample {
    pub timestamp_us: i64,
    /// Angular rates in deg/s, ordered (pan, tilt, roll).
    pub gyro: Vector3<f64>,
}

impl InertialSample {
    pub fn new(timestamp_us: i64, pan: f64, tilt: f64, roll: f64) -> Self {
        Self {
            timestamp_us,
            gyro: Vector3::new(pan, tilt, roll),
        }
    }

    /// Rotation about the sensor's vertical axis (yaw of the camera).
    #[inline]
    pub fn pan(&self) -> f64 {
        self.gyro.x
    }

    #[inline]
    pub fn tilt(&self) -> f64 {
        self.gyro.y
    }

    /// Rotation about the optical axis.
    #[inline]
    pub fn roll(&self) -> f64 {
        self.gyro.z
    }
}

/// Gyro bias per axis in deg/s. Persisted by the host between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GyroOffsets {
    pub pan: f64,
    pub tilt: f64,
    pub roll: f64,
}

impl GyroOffsets {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Offsets measured on a stationary DAVIS240 used until a calibration runs.
    pub fn factory() -> Self {
        Self {
            pan: 0.7216,
            tilt: 3.4707,
            roll: -0.2576,
        }
    }

    /// True when any axis carries a nonzero offset.
    pub fn is_set(&self) -> bool {
        self.pan != 0.0 || self.tilt != 0.0 || self.roll != 0.0
    }
}
