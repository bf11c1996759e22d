//! Reference flow used to score the measured flow.

use tracing::info;

use super::error::{GroundTruthError, GroundTruthResult};
use crate::event::FlowVector;
use crate::imu::ImuFlowEstimator;

/// Dense per-pixel flow valid over `[start_us, end_us)`.
///
/// Outside that window, or outside the grid, the reference is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundTruthTable {
    rows: usize,
    cols: usize,
    /// Row-major `[y * cols + x]`.
    vx: Vec<f64>,
    vy: Vec<f64>,
    start_us: i64,
    end_us: i64,
}

impl GroundTruthTable {
    /// Build a table from `vx[y][x]` and `vy[y][x]` grids.
    pub fn from_grids(
        vx: Vec<Vec<f64>>,
        vy: Vec<Vec<f64>>,
        start_us: i64,
        end_us: i64,
    ) -> GroundTruthResult<Self> {
        if start_us >= end_us {
            return Err(GroundTruthError::InvalidWindow {
                start: start_us,
                end: end_us,
            });
        }
        let (vx_rows, vx_cols) = shape(&vx);
        let (vy_rows, vy_cols) = shape(&vy);
        if vx_rows == 0 || vx_cols == 0 {
            return Err(GroundTruthError::Empty);
        }
        if (vx_rows, vx_cols) != (vy_rows, vy_cols)
            || vx.iter().chain(vy.iter()).any(|row| row.len() != vx_cols)
        {
            return Err(GroundTruthError::ShapeMismatch {
                vx_rows,
                vx_cols,
                vy_rows,
                vy_cols,
            });
        }

        Ok(Self {
            rows: vx_rows,
            cols: vx_cols,
            vx: vx.into_iter().flatten().collect(),
            vy: vy.into_iter().flatten().collect(),
            start_us,
            end_us,
        })
    }

    /// Reference flow at full-resolution pixel `(x, y)` and time `timestamp_us`.
    pub fn lookup(&self, x: usize, y: usize, timestamp_us: i64) -> FlowVector {
        if timestamp_us < self.start_us || timestamp_us >= self.end_us || x >= self.cols || y >= self.rows
        {
            return FlowVector::ZERO;
        }
        let i = y * self.cols + x;
        FlowVector::new(self.vx[i], self.vy[i])
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn window(&self) -> (i64, i64) {
        (self.start_us, self.end_us)
    }
}

fn shape(grid: &[Vec<f64>]) -> (usize, usize) {
    (grid.len(), grid.first().map_or(0, Vec::len))
}

/// Where the reference flow for accuracy measurement comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum GroundTruthSource {
    /// Flow predicted from the gyro at the event's position.
    #[default]
    Imu,
    /// A flow field imported from file.
    Imported(GroundTruthTable),
}

impl GroundTruthSource {
    /// Reference flow for an event at full-resolution `(x, y)`.
    ///
    /// The IMU estimate is zero until the estimator has an interval.
    pub fn reference(&self, imu: &ImuFlowEstimator, x: usize, y: usize, timestamp_us: i64) -> FlowVector {
        match self {
            GroundTruthSource::Imu => imu.calculate_flow(x as f64, y as f64).unwrap_or(FlowVector::ZERO),
            GroundTruthSource::Imported(table) => table.lookup(x, y, timestamp_us),
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, GroundTruthSource::Imported(_))
    }

    /// Install an imported table, replacing any previous one.
    pub fn import(&mut self, table: GroundTruthTable) {
        let (rows, cols) = table.shape();
        let (start, end) = table.window();
        info!(
            "Ground truth imported: {}x{} grid valid over [{}, {}) us",
            cols, rows, start, end
        );
        *self = GroundTruthSource::Imported(table);
    }

    /// Fall back to the IMU estimate.
    pub fn reset(&mut self) {
        if self.is_imported() {
            info!("Imported ground truth discarded");
        }
        *self = GroundTruthSource::Imu;
    }
}
