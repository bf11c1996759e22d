//! Sensor geometry shared by every spatial engine.
//!
//! The geometry is an immutable value. Changing the chip is an explicit
//! resize on the owning pipeline, which rebuilds every dependent array in
//! one step.

use serde::{Deserialize, Serialize};

/// Maximum allowed sensor dimension to prevent excessive memory allocation.
pub const MAX_SENSOR_DIM: u32 = 32768;

/// Pixel array dimensions and pitch of an event sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChipGeometry {
    pub width: u32,
    pub height: u32,
    /// Pixel pitch in micrometres.
    pub pixel_pitch_um: f64,
}

impl ChipGeometry {
    pub fn new(width: u32, height: u32, pixel_pitch_um: f64) -> Self {
        Self {
            width: width.min(MAX_SENSOR_DIM),
            height: height.min(MAX_SENSOR_DIM),
            pixel_pitch_um,
        }
    }

    /// DAVIS240 sensor: 240x180 pixels at 18.5 um.
    pub fn davis240() -> Self {
        Self::new(240, 180, 18.5)
    }

    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// True when the sensor has no pixels; spatial engines become no-ops.
    pub fn is_empty(&self) -> bool {
        self.num_pixels() == 0
    }

    /// Dimensions of a grid that stores one cell per `2^shift` pixels.
    #[inline]
    pub fn subsampled(&self, shift: u32) -> (usize, usize) {
        ((self.width >> shift) as usize, (self.height >> shift) as usize)
    }

    /// Sensor centre in pixel coordinates (integer division, as addresses are integral).
    #[inline]
    pub fn center(&self) -> (f64, f64) {
        ((self.width / 2) as f64, (self.height / 2) as f64)
    }

    /// Angle subtended by one pixel for a lens of the given focal length.
    ///
    /// ```text
    /// rad_per_pixel = atan(pitch_um / (1000 * focal_mm))
    /// ```
    pub fn rad_per_pixel(&self, focal_length_mm: f64) -> f64 {
        (self.pixel_pitch_um / (1000.0 * focal_length_mm)).atan()
    }
}

impl Default for ChipGeometry {
    fn default() -> Self {
        Self::davis240()
    }
}
