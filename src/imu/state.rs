//! IMU flow estimator state tracking.

/// Lifecycle of the gyro flow estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuState {
    /// No valid previous timestamp yet (after construction or reset).
    Uninitialized,
    /// Producing transforms from bias-corrected rates.
    Tracking,
    /// Averaging samples to estimate gyro offsets.
    Calibrating,
}

impl Default for ImuState {
    fn default() -> Self {
        Self::Uninitialized
    }
}
