//! Notifications emitted by the pipeline.
//!
//! They are returned from the call that caused them and forwarded to
//! subscribers by [`SharedPipeline`](super::SharedPipeline).

use crate::imu::GyroOffsets;

/// Why all pipeline state was cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetCause {
    /// Requested by the caller.
    Explicit,
    /// The input source was rewound.
    Rewind,
    /// An event was older than the last one at its address.
    NonMonotonicTimestamp {
        timestamp_us: i64,
        last_timestamp_us: i64,
    },
    /// Chip size or a subsample shift changed.
    GeometryChanged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineEvent {
    Reset(ResetCause),
    /// Arrays were rebuilt for new dimensions.
    Resized {
        width: u32,
        height: u32,
        subsample_shift: u32,
        field_subsample_shift: u32,
    },
    /// Gyro calibration finished with these offsets.
    Recalibrated(GyroOffsets),
}

impl PipelineEvent {
    pub fn is_reset(&self) -> bool {
        matches!(self, PipelineEvent::Reset(_))
    }
}
