//! Pipeline notifications and the thread-safe front end.

pub mod messages;
pub mod shared_state;

pub use messages::{PipelineEvent, ResetCause};
pub use shared_state::{NOTIFICATION_CHANNEL_CAPACITY, SharedPipeline};
