//! Accuracy and timing statistics for the flow output.

use std::fmt;

use super::global_motion::{GlobalMotion, GlobalMotionSample};
use super::measurand::Measurand;
use crate::config::{FlowConfig, StatisticsConfig};
use crate::event::FlowVector;

/// Unsigned angle between two flow vectors in degrees, within `[0, 180]`.
///
/// Zero vectors have no direction and give zero.
pub fn angular_error_deg(measured: FlowVector, reference: FlowVector) -> f64 {
    let cross = measured.vx * reference.vy - measured.vy * reference.vx;
    cross.atan2(measured.dot(&reference)).abs().to_degrees()
}

/// Magnitude of the difference vector in px/s.
pub fn endpoint_error(measured: FlowVector, reference: FlowVector) -> f64 {
    (measured.vx - reference.vx).hypot(measured.vy - reference.vy)
}

/// Rejects events much faster than the recent average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedGate {
    avg_speed: f64,
    mixing_factor: f64,
    reject_factor: f64,
}

impl SpeedGate {
    pub fn new(mixing_factor: f64, reject_factor: f64) -> Self {
        Self {
            avg_speed: 0.0,
            mixing_factor,
            reject_factor,
        }
    }

    /// Fold `speed` into the average, then test it against the updated average.
    pub fn is_speeder(&mut self, speed: f64) -> bool {
        self.avg_speed = (1.0 - self.mixing_factor) * self.avg_speed + self.mixing_factor * speed;
        speed > self.avg_speed * self.reject_factor
    }

    pub fn avg_speed(&self) -> f64 {
        self.avg_speed
    }

    pub fn set_avg_speed(&mut self, avg_speed: f64) {
        self.avg_speed = avg_speed;
    }

    pub fn set_mixing_factor(&mut self, mixing_factor: f64) {
        self.mixing_factor = mixing_factor;
    }

    pub fn set_reject_factor(&mut self, reject_factor: f64) {
        self.reject_factor = reject_factor;
    }

    pub fn reset(&mut self) {
        self.avg_speed = 0.0;
    }
}

/// Point-in-time copy of the statistics, safe to hand to other threads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatisticsSummary {
    pub angular_error_deg: Measurand,
    pub endpoint_error_abs: Measurand,
    pub endpoint_error_rel_pct: Measurand,
    pub packet_time_us: Measurand,
    pub event_time_us: Measurand,
    pub global_vx: Measurand,
    pub global_vy: Measurand,
    pub global_rotation: Measurand,
    pub global_expansion: Measurand,
    pub last_global_motion: Option<GlobalMotionSample>,
    pub avg_speed: f64,
    /// Advisory: accuracy against IMU ground truth is meaningless without offsets.
    pub calibration_set: bool,
}

impl fmt::Display for StatisticsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Angular error [deg]: {}", self.angular_error_deg)?;
        writeln!(f, "Endpoint error [px/s]: {}", self.endpoint_error_abs)?;
        writeln!(f, "Relative endpoint error [%]: {}", self.endpoint_error_rel_pct)?;
        writeln!(f, "Processing time [us/packet]: {}", self.packet_time_us)?;
        writeln!(f, "Processing time [us/event]: {}", self.event_time_us)?;
        if self.global_vx.count() > 0 {
            writeln!(f, "Global vx [px/s]: {}", self.global_vx)?;
            writeln!(f, "Global vy [px/s]: {}", self.global_vy)?;
            writeln!(f, "Global rotation [rad/s]: {}", self.global_rotation)?;
            writeln!(f, "Global expansion [1/s]: {}", self.global_expansion)?;
        }
        writeln!(f, "Average speed [px/s]: {:.2}", self.avg_speed)?;
        write!(f, "IMU calibration set: {}", self.calibration_set)
    }
}

pub struct FlowStatistics {
    config: StatisticsConfig,
    speed_control_enabled: bool,
    speed_gate: SpeedGate,

    angular_error: Measurand,
    endpoint_error_abs: Measurand,
    endpoint_error_rel: Measurand,
    packet_time_us: Measurand,
    event_time_us: Measurand,
    global_motion: GlobalMotion,
}

impl FlowStatistics {
    pub fn new(config: &FlowConfig) -> Self {
        Self {
            config: config.statistics.clone(),
            speed_control_enabled: config.speed_control_enabled,
            speed_gate: SpeedGate::new(config.speed_mixing_factor, config.excess_speed_reject_factor),
            angular_error: Measurand::new(),
            endpoint_error_abs: Measurand::new(),
            endpoint_error_rel: Measurand::new(),
            packet_time_us: Measurand::new(),
            event_time_us: Measurand::new(),
            global_motion: GlobalMotion::new(config.chip.center()),
        }
    }

    /// True if the event should be kept out of the field and the statistics.
    ///
    /// The speed gate only sees events while speed control is enabled, so its
    /// average does not move otherwise.
    pub fn accuracy_tests(&mut self, measured: FlowVector, reference: FlowVector) -> bool {
        if self.speed_control_enabled && self.speed_gate.is_speeder(measured.speed()) {
            return true;
        }
        self.config.discard_outliers_enabled
            && angular_error_deg(measured, reference) > self.config.discard_outliers_max_angle_deg
    }

    /// Record the error of one measured vector against its reference.
    pub fn record_accuracy(&mut self, measured: FlowVector, reference: FlowVector) {
        if !self.config.measure_accuracy || !measured.is_finite() || !reference.is_finite() {
            return;
        }
        self.angular_error.update(angular_error_deg(measured, reference));
        let ee = endpoint_error(measured, reference);
        self.endpoint_error_abs.update(ee);
        let reference_speed = reference.speed();
        if reference_speed > 0.0 {
            self.endpoint_error_rel.update(100.0 * ee / reference_speed);
        }
    }

    pub fn record_global_motion(&mut self, x: f64, y: f64, flow: FlowVector) {
        if self.config.measure_global_motion {
            self.global_motion.update(x, y, flow);
        }
    }

    /// Close a packet: record its processing time and global motion.
    pub fn finish_packet(&mut self, elapsed_us: f64, events: u64) -> Option<GlobalMotionSample> {
        if self.config.measure_processing_time {
            self.packet_time_us.update(elapsed_us);
            if events > 0 {
                self.event_time_us.update(elapsed_us / events as f64);
            }
        }
        if self.config.measure_global_motion {
            self.global_motion.finish_packet()
        } else {
            None
        }
    }

    pub fn summary(&self, calibration_set: bool) -> StatisticsSummary {
        StatisticsSummary {
            angular_error_deg: self.angular_error,
            endpoint_error_abs: self.endpoint_error_abs,
            endpoint_error_rel_pct: self.endpoint_error_rel,
            packet_time_us: self.packet_time_us,
            event_time_us: self.event_time_us,
            global_vx: self.global_motion.mean_vx,
            global_vy: self.global_motion.mean_vy,
            global_rotation: self.global_motion.rotation,
            global_expansion: self.global_motion.expansion,
            last_global_motion: self.global_motion.last_packet(),
            avg_speed: self.speed_gate.avg_speed(),
            calibration_set,
        }
    }

    pub fn reset(&mut self) {
        self.angular_error.reset();
        self.endpoint_error_abs.reset();
        self.endpoint_error_rel.reset();
        self.packet_time_us.reset();
        self.event_time_us.reset();
        self.global_motion.reset();
        self.speed_gate.reset();
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: StatisticsConfig) {
        self.config = config;
    }

    pub fn set_speed_control(&mut self, enabled: bool, mixing_factor: f64, reject_factor: f64) {
        self.speed_control_enabled = enabled;
        self.speed_gate.set_mixing_factor(mixing_factor);
        self.speed_gate.set_reject_factor(reject_factor);
    }

    pub fn set_center(&mut self, center: (f64, f64)) {
        self.global_motion.set_center(center);
    }

    pub fn speed_gate(&self) -> &SpeedGate {
        &self.speed_gate
    }

    pub fn angular_error(&self) -> &Measurand {
        &self.angular_error
    }

    pub fn endpoint_error_abs(&self) -> &Measurand {
        &self.endpoint_error_abs
    }

    pub fn endpoint_error_rel(&self) -> &Measurand {
        &self.endpoint_error_rel
    }

    pub fn packet_time_us(&self) -> &Measurand {
        &self.packet_time_us
    }
}
