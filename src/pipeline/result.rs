//! Per-packet output and counters.

use std::fmt;

use crate::admission::RejectReason;
use crate::event::MotionEvent;
use crate::field::FieldUpdate;
use crate::stats::GlobalMotionSample;
use crate::system::PipelineEvent;

/// How many items took each path through the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounters {
    pub events_in: u64,
    pub imu_samples: u64,
    pub admitted: u64,
    pub out_of_bounds: u64,
    pub outside_window: u64,
    pub already_set: u64,
    pub too_soon: u64,
    /// Events dropped because their timestamp forced a reset.
    pub non_monotonic: u64,
    /// Admitted events with a nonzero flow estimate.
    pub with_flow: u64,
    pub outliers: u64,
    pub field_updated: u64,
    pub field_rejected: u64,
}

impl PacketCounters {
    pub fn count_rejection(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::OutOfBounds => self.out_of_bounds += 1,
            RejectReason::OutsideWindow => self.outside_window += 1,
            RejectReason::AlreadySetThisPacket => self.already_set += 1,
            RejectReason::TooSoon => self.too_soon += 1,
        }
    }

    pub fn count_field_update(&mut self, update: FieldUpdate) {
        match update {
            FieldUpdate::Blended | FieldUpdate::Replaced => self.field_updated += 1,
            FieldUpdate::Rejected(_) => self.field_rejected += 1,
            FieldUpdate::Disabled | FieldUpdate::OutOfRange => {}
        }
    }

    /// Events that never reached the flow algorithm.
    pub fn rejected(&self) -> u64 {
        self.out_of_bounds + self.outside_window + self.already_set + self.too_soon + self.non_monotonic
    }

    pub fn accumulate(&mut self, other: &PacketCounters) {
        self.events_in += other.events_in;
        self.imu_samples += other.imu_samples;
        self.admitted += other.admitted;
        self.out_of_bounds += other.out_of_bounds;
        self.outside_window += other.outside_window;
        self.already_set += other.already_set;
        self.too_soon += other.too_soon;
        self.non_monotonic += other.non_monotonic;
        self.with_flow += other.with_flow;
        self.outliers += other.outliers;
        self.field_updated += other.field_updated;
        self.field_rejected += other.field_rejected;
    }
}

impl fmt::Display for PacketCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "in={} imu={} admitted={} flow={} outliers={} rejected={} (bounds={} window={} dup={} refractory={} non-monotonic={}) field={}/{}",
            self.events_in,
            self.imu_samples,
            self.admitted,
            self.with_flow,
            self.outliers,
            self.rejected(),
            self.out_of_bounds,
            self.outside_window,
            self.already_set,
            self.too_soon,
            self.non_monotonic,
            self.field_updated,
            self.field_updated + self.field_rejected
        )
    }
}

/// Everything produced by one packet.
#[derive(Debug, Clone, Default)]
pub struct PacketResult {
    /// One entry per admitted event, in input order.
    pub events: Vec<MotionEvent>,
    pub notifications: Vec<PipelineEvent>,
    pub counters: PacketCounters,
    pub global_motion: Option<GlobalMotionSample>,
    pub elapsed_us: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldRejection;

    #[test]
    fn test_rejection_counts() {
        let mut c = PacketCounters::default();
        c.count_rejection(RejectReason::TooSoon);
        c.count_rejection(RejectReason::TooSoon);
        c.count_rejection(RejectReason::OutsideWindow);
        c.non_monotonic = 1;
        assert_eq!(c.rejected(), 4);

        let mut total = PacketCounters::default();
        total.accumulate(&c);
        total.accumulate(&c);
        assert_eq!(total.too_soon, 4);
        assert_eq!(total.rejected(), 8);
    }

    #[test]
    fn test_field_update_counts() {
        let mut c = PacketCounters::default();
        c.count_field_update(FieldUpdate::Replaced);
        c.count_field_update(FieldUpdate::Blended);
        c.count_field_update(FieldUpdate::Rejected(FieldRejection::Stale));
        c.count_field_update(FieldUpdate::Disabled);
        assert_eq!((c.field_updated, c.field_rejected), (2, 1));
    }
}
