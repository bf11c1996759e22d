use std::fmt;

use super::flow::FlowVector;
use super::record::{EventRecord, Polarity};

/// An admitted input event enriched with its flow estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEvent {
    /// Full-resolution address of the (possibly subsampled) cell.
    pub x: u16,
    pub y: u16,
    pub timestamp_us: i64,
    pub polarity: Polarity,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
    /// True when a nonzero flow was estimated.
    pub has_direction: bool,
    /// Flagged by the speed or angular gate. Outliers never reach the motion
    /// field or the statistics; the caller decides what to do with them.
    pub outlier: bool,
}

impl MotionEvent {
    pub fn new(source: &EventRecord, x: u16, y: u16, flow: Option<FlowVector>) -> Self {
        let flow = flow.unwrap_or(FlowVector::ZERO);
        let speed = flow.speed();
        Self {
            x,
            y,
            timestamp_us: source.timestamp_us,
            polarity: source.polarity,
            vx: flow.vx,
            vy: flow.vy,
            speed,
            has_direction: speed != 0.0,
            outlier: false,
        }
    }

    pub fn flow(&self) -> FlowVector {
        FlowVector::new(self.vx, self.vy)
    }
}

/// One text record per event: `timestamp x y type vx vy speed valid`.
impl fmt::Display for MotionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {:.3} {:.3} {:.3} {}",
            self.timestamp_us,
            self.x,
            self.y,
            self.polarity.index(),
            self.vx,
            self.vy,
            self.speed,
            u8::from(self.has_direction)
        )
    }
}
