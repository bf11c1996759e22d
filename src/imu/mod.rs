pub mod calibration;
pub mod estimator;
pub mod sample;
pub mod state;

pub use calibration::GyroCalibrator;
pub use estimator::{ImuFlowEstimator, TransformUpdate};
pub use sample::{GyroOffsets, InertialSample};
pub use state::ImuState;
