//! Pipeline configuration.
//!
//! Every block has a `Default` matching the recommended settings and can be
//! loaded from YAML with missing keys falling back to those defaults.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::geometry::ChipGeometry;
use crate::imu::GyroOffsets;

/// Largest admission subsample shift.
pub const MAX_SUBSAMPLE_SHIFT: u32 = 4;

/// Largest motion field subsample shift.
pub const MAX_FIELD_SUBSAMPLE_SHIFT: u32 = 5;

/// Smallest accepted mixing factor for the motion field blend.
pub const MIN_FIELD_MIXING_FACTOR: f64 = 1e-6;

/// Top-level configuration of the flow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub chip: ChipGeometry,

    /// Bits dropped from event addresses before admission.
    pub subsample_shift: u32,

    /// Events at the same pixel and type closer than this are suppressed.
    pub refractory_period_us: i64,

    /// Border (in subsampled pixels) required by the upstream flow algorithm.
    pub search_margin: u32,

    /// Processing window, in subsampled pixel coordinates.
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,

    /// Reject events much faster than the running average speed.
    pub speed_control_enabled: bool,
    pub speed_mixing_factor: f64,
    pub excess_speed_reject_factor: f64,

    pub imu: ImuConfig,
    pub field: MotionFieldConfig,
    pub statistics: StatisticsConfig,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            chip: ChipGeometry::default(),
            subsample_shift: 0,
            refractory_period_us: 0,
            search_margin: 0,
            x_min: 0,
            x_max: 1000,
            y_min: 0,
            y_max: 1000,
            speed_control_enabled: false,
            speed_mixing_factor: 1e-3,
            excess_speed_reject_factor: 2.0,
            imu: ImuConfig::default(),
            field: MotionFieldConfig::default(),
            statistics: StatisticsConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Load a configuration from a YAML file and validate it.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let config: FlowConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every option against its documented range.
    pub fn validate(&self) -> Result<()> {
        if self.subsample_shift > MAX_SUBSAMPLE_SHIFT {
            bail!(
                "subsample_shift must be in 0..={}, got {}",
                MAX_SUBSAMPLE_SHIFT,
                self.subsample_shift
            );
        }
        if self.refractory_period_us < 0 {
            bail!("refractory_period_us must be >= 0, got {}", self.refractory_period_us);
        }
        if self.x_min > self.x_max || self.y_min > self.y_max {
            bail!(
                "processing window is inverted: x {}..{}, y {}..{}",
                self.x_min,
                self.x_max,
                self.y_min,
                self.y_max
            );
        }
        if !(self.speed_mixing_factor > 0.0 && self.speed_mixing_factor <= 1.0) {
            bail!("speed_mixing_factor must be in (0, 1], got {}", self.speed_mixing_factor);
        }
        if !(self.excess_speed_reject_factor > 0.0) {
            bail!(
                "excess_speed_reject_factor must be > 0, got {}",
                self.excess_speed_reject_factor
            );
        }
        if !(self.chip.pixel_pitch_um > 0.0) {
            bail!("chip.pixel_pitch_um must be > 0, got {}", self.chip.pixel_pitch_um);
        }
        self.imu.validate()?;
        self.field.validate()?;
        self.statistics.validate()?;
        Ok(())
    }
}

/// Gyro flow prediction and calibration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// Samples averaged when estimating gyro offsets.
    pub calibration_sample_count: u32,
    /// Needed to convert rad/s to pixel/s.
    pub lens_focal_length_mm: f64,
    /// Samples discarded after a stream or timestamp reset.
    pub flush_count: u32,
    /// Persisted gyro offsets (deg/s).
    pub offsets: GyroOffsets,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            calibration_sample_count: 100,
            lens_focal_length_mm: 4.5,
            flush_count: 1,
            offsets: GyroOffsets::factory(),
        }
    }
}

impl ImuConfig {
    fn validate(&self) -> Result<()> {
        if self.calibration_sample_count == 0 {
            bail!("imu.calibration_sample_count must be > 0");
        }
        if !(self.lens_focal_length_mm > 0.0) {
            bail!("imu.lens_focal_length_mm must be > 0, got {}", self.lens_focal_length_mm);
        }
        Ok(())
    }
}

/// Motion field aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionFieldConfig {
    pub enabled: bool,
    /// One field cell per `2^subsample_shift` pixels in each dimension.
    pub subsample_shift: u32,
    /// Weight of a new flow event in the cell blend. 1 replaces the cell.
    pub mixing_factor: f64,
    /// Cells older than this are stale for display and for blending.
    pub max_age_us: i64,
    pub consistent_with_neighbors: bool,
    pub consistent_with_current_angle: bool,
    /// Cells slower than this (px/s) are skipped when enumerating.
    pub min_visible_speed: f64,
}

impl Default for MotionFieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            subsample_shift: 3,
            mixing_factor: 0.1,
            max_age_us: 100_000,
            consistent_with_neighbors: false,
            consistent_with_current_angle: false,
            min_visible_speed: 1.0,
        }
    }
}

impl MotionFieldConfig {
    fn validate(&self) -> Result<()> {
        if self.subsample_shift > MAX_FIELD_SUBSAMPLE_SHIFT {
            bail!(
                "field.subsample_shift must be in 0..={}, got {}",
                MAX_FIELD_SUBSAMPLE_SHIFT,
                self.subsample_shift
            );
        }
        if !(self.mixing_factor > 0.0 && self.mixing_factor <= 1.0) {
            bail!("field.mixing_factor must be in (0, 1], got {}", self.mixing_factor);
        }
        if self.max_age_us < 0 {
            bail!("field.max_age_us must be >= 0, got {}", self.max_age_us);
        }
        Ok(())
    }
}

/// Accuracy and timing measurement settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Compare measured flow with ground truth.
    pub measure_accuracy: bool,
    pub measure_processing_time: bool,
    /// Track global translation, rotation and expansion per packet.
    pub measure_global_motion: bool,
    /// Treat events deviating from ground truth by more than the threshold as outliers.
    pub discard_outliers_enabled: bool,
    pub discard_outliers_max_angle_deg: f64,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            measure_accuracy: false,
            measure_processing_time: false,
            measure_global_motion: false,
            discard_outliers_enabled: false,
            discard_outliers_max_angle_deg: 10.0,
        }
    }
}

impl StatisticsConfig {
    fn validate(&self) -> Result<()> {
        if !(0.0..=180.0).contains(&self.discard_outliers_max_angle_deg) {
            bail!(
                "statistics.discard_outliers_max_angle_deg must be in [0, 180], got {}",
                self.discard_outliers_max_angle_deg
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        assert!(FlowConfig::default().validate().is_ok());
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = FlowConfig::default();
        assert_eq!(config.speed_mixing_factor, 1e-3);
        assert_eq!(config.excess_speed_reject_factor, 2.0);
        assert_eq!(config.imu.calibration_sample_count, 100);
        assert_eq!(config.imu.flush_count, 1);
        assert_eq!(config.field.subsample_shift, 3);
        assert_eq!(config.field.max_age_us, 100_000);
        assert!(!config.field.consistent_with_neighbors);
        assert!(!config.field.consistent_with_current_angle);
        assert_eq!(config.statistics.discard_outliers_max_angle_deg, 10.0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut config = FlowConfig::default();
        config.subsample_shift = 5;
        assert!(config.validate().is_err());

        let mut config = FlowConfig::default();
        config.field.mixing_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = FlowConfig::default();
        config.imu.lens_focal_length_mm = -1.0;
        assert!(config.validate().is_err());

        let mut config = FlowConfig::default();
        config.x_min = 50;
        config.x_max = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "subsample_shift: 1\nrefractory_period_us: 500\nfield:\n  subsample_shift: 2\n  consistent_with_neighbors: true\nimu:\n  lens_focal_length_mm: 6.0\n"
        )
        .unwrap();

        let config = FlowConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.subsample_shift, 1);
        assert_eq!(config.refractory_period_us, 500);
        assert_eq!(config.field.subsample_shift, 2);
        assert!(config.field.consistent_with_neighbors);
        assert_eq!(config.field.mixing_factor, 0.1);
        assert_eq!(config.imu.lens_focal_length_mm, 6.0);
        assert_eq!(config.imu.calibration_sample_count, 100);
        assert_eq!(config.chip, ChipGeometry::davis240());
    }

    #[test]
    fn test_invalid_yaml_value_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "field:\n  subsample_shift: 9\n").unwrap();
        assert!(FlowConfig::from_yaml_file(file.path()).is_err());
    }
}
