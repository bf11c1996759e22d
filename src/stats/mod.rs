pub mod flow_statistics;
pub mod global_motion;
pub mod measurand;

pub use flow_statistics::{FlowStatistics, SpeedGate, StatisticsSummary, angular_error_deg, endpoint_error};
pub use global_motion::{GlobalMotion, GlobalMotionSample};
pub use measurand::Measurand;
