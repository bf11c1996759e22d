//! Event stream data types.
//!
//! Events and inertial samples arrive interleaved in one timestamp-ordered
//! stream and are processed in bounded packets.

pub mod flow;
pub mod output;
pub mod record;

pub use flow::FlowVector;
pub use output::MotionEvent;
pub use record::{EventRecord, Polarity};

use crate::imu::InertialSample;

/// One item of the sensor stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamItem {
    Event(EventRecord),
    Inertial(InertialSample),
}

impl StreamItem {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            StreamItem::Event(e) => e.timestamp_us,
            StreamItem::Inertial(s) => s.timestamp_us,
        }
    }
}

impl From<EventRecord> for StreamItem {
    fn from(e: EventRecord) -> Self {
        StreamItem::Event(e)
    }
}

impl From<InertialSample> for StreamItem {
    fn from(s: InertialSample) -> Self {
        StreamItem::Inertial(s)
    }
}

/// Split a stream into packets of at most `packet_size` items.
pub fn chunk_packets(items: &[StreamItem], packet_size: usize) -> impl Iterator<Item = &[StreamItem]> {
    items.chunks(packet_size.max(1))
}
