pub mod ground_truth;
pub mod motion_log;
pub mod recording;

pub use ground_truth::load_ground_truth_dir;
pub use motion_log::{DEFAULT_LOG_CAPACITY, MotionEventSink, MotionVectorLogger};
pub use recording::{Recording, load_recording};
