//! The upstream per-event flow computation.

use crate::admission::SpatialIndexMap;
use crate::event::{EventRecord, FlowVector};
use crate::imu::ImuFlowEstimator;

/// What an algorithm may look at while computing flow for one event.
pub struct FlowContext<'a> {
    /// Subsampled address of the event.
    pub x: usize,
    pub y: usize,
    pub subsample_shift: u32,
    /// Timestamps of previously admitted events.
    pub timestamps: &'a SpatialIndexMap,
    pub imu: &'a ImuFlowEstimator,
}

/// Computes optical flow for an admitted event.
///
/// Any `FnMut(&EventRecord, &FlowContext) -> Option<FlowVector>` closure is an
/// algorithm with no search margin.
pub trait FlowAlgorithm {
    /// Flow in px/s, or `None` when there is no estimate for this event.
    fn compute_flow(&mut self, event: &EventRecord, ctx: &FlowContext<'_>) -> Option<FlowVector>;

    /// Border in subsampled pixels the algorithm reads around each event.
    fn search_distance(&self) -> usize {
        0
    }

    /// Drop any internal history.
    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "custom"
    }
}

impl<F> FlowAlgorithm for F
where
    F: FnMut(&EventRecord, &FlowContext<'_>) -> Option<FlowVector>,
{
    fn compute_flow(&mut self, event: &EventRecord, ctx: &FlowContext<'_>) -> Option<FlowVector> {
        self(event, ctx)
    }
}

/// Uses the gyro-predicted flow at the event's pixel as the measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuFlowAlgorithm;

impl FlowAlgorithm for ImuFlowAlgorithm {
    fn compute_flow(&mut self, event: &EventRecord, ctx: &FlowContext<'_>) -> Option<FlowVector> {
        ctx.imu.calculate_flow(f64::from(event.x), f64::from(event.y))
    }

    fn name(&self) -> &str {
        "imu"
    }
}
