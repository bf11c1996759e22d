//! Low-resolution aggregate of recent flow events.
//!
//! Every flow event is folded into the cell that contains it with an
//! exponential blend. Optional consistency checks keep vectors that disagree
//! with the cell or its neighbours out of the blend.

use tracing::debug;

use crate::config::{MAX_FIELD_SUBSAMPLE_SHIFT, MIN_FIELD_MIXING_FACTOR, MotionFieldConfig};
use crate::event::FlowVector;
use crate::geometry::ChipGeometry;

/// Timestamp of a cell that has never been written.
pub const NEVER_UPDATED: i64 = i64::MAX;

const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(-1, 0), (0, 1), (1, 0), (0, -1)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRejection {
    /// The cell's last update is older than the maximum age.
    Stale,
    /// Points against the vector already in the cell.
    AngleInconsistent,
    /// Does not agree with a strict majority of the axis neighbours.
    NeighborsInconsistent,
}

/// What an update did to the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Disabled,
    OutOfRange,
    /// Blended into an existing value.
    Blended,
    /// Written into a vacant cell.
    Replaced,
    Rejected(FieldRejection),
}

/// A cell that is recent and fast enough to display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleCell {
    pub ix: usize,
    pub iy: usize,
    /// Cell centre in full-resolution pixels.
    pub x: f64,
    pub y: f64,
    pub vx: f64,
    pub vy: f64,
    pub speed: f64,
}

/// Cell arrays, indexed `[iy * cols + ix]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldGrid {
    pub subsample_shift: u32,
    pub cols: usize,
    pub rows: usize,
    pub vx: Vec<f64>,
    pub vy: Vec<f64>,
    pub speed: Vec<f64>,
    pub last_ts: Vec<i64>,
    pub vacant: Vec<bool>,
}

impl FieldGrid {
    fn new(geometry: &ChipGeometry, subsample_shift: u32) -> Self {
        let (cols, rows) = if geometry.is_empty() {
            (0, 0)
        } else {
            (
                (geometry.width >> subsample_shift) as usize + 1,
                (geometry.height >> subsample_shift) as usize + 1,
            )
        };
        let n = cols * rows;
        Self {
            subsample_shift,
            cols,
            rows,
            vx: vec![0.0; n],
            vy: vec![0.0; n],
            speed: vec![0.0; n],
            last_ts: vec![NEVER_UPDATED; n],
            vacant: vec![true; n],
        }
    }

    fn clear(&mut self) {
        self.vx.fill(0.0);
        self.vy.fill(0.0);
        self.speed.fill(0.0);
        self.last_ts.fill(NEVER_UPDATED);
        self.vacant.fill(true);
    }

    #[inline]
    pub fn index(&self, ix: usize, iy: usize) -> Option<usize> {
        (ix < self.cols && iy < self.rows).then(|| iy * self.cols + ix)
    }

    pub fn flow_at(&self, ix: usize, iy: usize) -> Option<FlowVector> {
        self.index(ix, iy).map(|i| FlowVector::new(self.vx[i], self.vy[i]))
    }

    /// Centre of a cell in full-resolution pixels.
    pub fn cell_center(&self, ix: usize, iy: usize) -> (f64, f64) {
        let half = (1u64 << self.subsample_shift) as f64 * 0.5;
        (
            ((ix << self.subsample_shift) as f64) + half,
            ((iy << self.subsample_shift) as f64) + half,
        )
    }

    /// Cells updated within `max_age_us` of `reference_ts` and at least `min_speed` fast.
    ///
    /// Never-updated cells are always stale.
    pub fn visible_cells(&self, reference_ts: i64, max_age_us: i64, min_speed: f64) -> Vec<VisibleCell> {
        let mut cells = Vec::new();
        if reference_ts == NEVER_UPDATED {
            return cells;
        }
        for iy in 0..self.rows {
            for ix in 0..self.cols {
                let i = iy * self.cols + ix;
                if self.last_ts[i] == NEVER_UPDATED {
                    continue;
                }
                let dt = reference_ts.saturating_sub(self.last_ts[i]);
                if dt > max_age_us || dt < 0 {
                    continue;
                }
                if self.speed[i] < min_speed {
                    continue;
                }
                let (x, y) = self.cell_center(ix, iy);
                cells.push(VisibleCell {
                    ix,
                    iy,
                    x,
                    y,
                    vx: self.vx[i],
                    vy: self.vy[i],
                    speed: self.speed[i],
                });
            }
        }
        cells
    }
}

/// Read-only copy of the field published to observers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSnapshot {
    pub grid: FieldGrid,
    pub last_update_timestamp_us: i64,
    pub max_age_us: i64,
    pub min_visible_speed: f64,
}

impl FieldSnapshot {
    pub fn visible_cells(&self) -> Vec<VisibleCell> {
        self.grid
            .visible_cells(self.last_update_timestamp_us, self.max_age_us, self.min_visible_speed)
    }
}

pub struct MotionField {
    geometry: ChipGeometry,
    config: MotionFieldConfig,
    grid: FieldGrid,
    last_update_timestamp_us: i64,
}

impl MotionField {
    pub fn new(geometry: ChipGeometry, config: &MotionFieldConfig) -> Self {
        let mut config = config.clone();
        config.subsample_shift = config.subsample_shift.min(MAX_FIELD_SUBSAMPLE_SHIFT);
        config.mixing_factor = config.mixing_factor.clamp(MIN_FIELD_MIXING_FACTOR, 1.0);
        Self {
            grid: FieldGrid::new(&geometry, config.subsample_shift),
            geometry,
            config,
            last_update_timestamp_us: NEVER_UPDATED,
        }
    }

    /// Zero every cell and mark all of them as never updated.
    pub fn reset(&mut self) {
        self.grid.clear();
        self.last_update_timestamp_us = NEVER_UPDATED;
    }

    /// Rebuild the arrays for a new chip.
    pub fn resize(&mut self, geometry: ChipGeometry) {
        self.geometry = geometry;
        self.reallocate();
    }

    fn reallocate(&mut self) {
        self.grid = FieldGrid::new(&self.geometry, self.config.subsample_shift);
        self.last_update_timestamp_us = NEVER_UPDATED;
    }

    /// Fold one flow event at full-resolution pixel `(x, y)` into its cell.
    pub fn update(&mut self, timestamp_us: i64, x: u32, y: u32, vx: f64, vy: f64, speed: f64) -> FieldUpdate {
        if !self.config.enabled {
            return FieldUpdate::Disabled;
        }
        self.last_update_timestamp_us = timestamp_us;

        let shift = self.grid.subsample_shift;
        let (ix, iy) = ((x >> shift) as usize, (y >> shift) as usize);
        let Some(i) = self.grid.index(ix, iy) else {
            return FieldUpdate::OutOfRange;
        };

        let result = match self.check_consistent(timestamp_us, ix, iy, i, vx, vy) {
            Err(reason) => {
                if reason == FieldRejection::Stale {
                    self.grid.vx[i] = 0.0;
                    self.grid.vy[i] = 0.0;
                    self.grid.speed[i] = 0.0;
                    self.grid.vacant[i] = true;
                }
                FieldUpdate::Rejected(reason)
            }
            Ok(()) if self.grid.vacant[i] => {
                self.grid.vx[i] = vx;
                self.grid.vy[i] = vy;
                self.grid.speed[i] = speed;
                self.grid.vacant[i] = false;
                FieldUpdate::Replaced
            }
            Ok(()) => {
                let a = self.config.mixing_factor;
                self.grid.vx[i] = (1.0 - a) * self.grid.vx[i] + a * vx;
                self.grid.vy[i] = (1.0 - a) * self.grid.vy[i] + a * vy;
                self.grid.speed[i] = speed;
                FieldUpdate::Blended
            }
        };
        self.grid.last_ts[i] = timestamp_us;
        result
    }

    fn check_consistent(
        &self,
        timestamp_us: i64,
        ix: usize,
        iy: usize,
        i: usize,
        vx: f64,
        vy: f64,
    ) -> Result<(), FieldRejection> {
        let last = self.grid.last_ts[i];
        if last != NEVER_UPDATED && timestamp_us.saturating_sub(last) > self.config.max_age_us {
            return Err(FieldRejection::Stale);
        }

        if self.config.consistent_with_current_angle {
            let dot = vx * self.grid.vx[i] + vy * self.grid.vy[i];
            if dot < 0.0 {
                return Err(FieldRejection::AngleInconsistent);
            }
        }

        if self.config.consistent_with_neighbors {
            let mut count = 0;
            let mut consistent = 0;
            for (dx, dy) in NEIGHBOR_OFFSETS {
                let (Some(nx), Some(ny)) = (ix.checked_add_signed(dx), iy.checked_add_signed(dy)) else {
                    continue;
                };
                let Some(j) = self.grid.index(nx, ny) else {
                    continue;
                };
                count += 1;
                if vx * self.grid.vx[j] + vy * self.grid.vy[j] >= 0.0 {
                    consistent += 1;
                }
            }
            if consistent <= count / 2 {
                return Err(FieldRejection::NeighborsInconsistent);
            }
        }
        Ok(())
    }

    pub fn visible_cells(&self) -> Vec<VisibleCell> {
        self.grid.visible_cells(
            self.last_update_timestamp_us,
            self.config.max_age_us,
            self.config.min_visible_speed,
        )
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        FieldSnapshot {
            grid: self.grid.clone(),
            last_update_timestamp_us: self.last_update_timestamp_us,
            max_age_us: self.config.max_age_us,
            min_visible_speed: self.config.min_visible_speed,
        }
    }

    pub fn grid(&self) -> &FieldGrid {
        &self.grid
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.grid.cols, self.grid.rows)
    }

    pub fn last_update_timestamp_us(&self) -> Option<i64> {
        (self.last_update_timestamp_us != NEVER_UPDATED).then_some(self.last_update_timestamp_us)
    }

    pub fn config(&self) -> &MotionFieldConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    /// Change the cell size; the field is rebuilt and its contents are lost.
    pub fn set_subsample_shift(&mut self, shift: u32) {
        let clamped = shift.min(MAX_FIELD_SUBSAMPLE_SHIFT);
        if clamped != shift {
            debug!("field subsample shift {} clamped to {}", shift, clamped);
        }
        self.config.subsample_shift = clamped;
        self.reallocate();
    }

    pub fn subsample_shift(&self) -> u32 {
        self.config.subsample_shift
    }

    pub fn set_mixing_factor(&mut self, factor: f64) {
        let clamped = if factor.is_nan() {
            MIN_FIELD_MIXING_FACTOR
        } else {
            factor.clamp(MIN_FIELD_MIXING_FACTOR, 1.0)
        };
        if clamped != factor {
            debug!("field mixing factor {} clamped to {}", factor, clamped);
        }
        self.config.mixing_factor = clamped;
    }

    pub fn mixing_factor(&self) -> f64 {
        self.config.mixing_factor
    }

    pub fn set_max_age_us(&mut self, max_age_us: i64) {
        self.config.max_age_us = max_age_us.max(0);
    }

    pub fn set_consistent_with_neighbors(&mut self, enabled: bool) {
        self.config.consistent_with_neighbors = enabled;
    }

    pub fn set_consistent_with_current_angle(&mut self, enabled: bool) {
        self.config.consistent_with_current_angle = enabled;
    }

    pub fn set_min_visible_speed(&mut self, speed: f64) {
        self.config.min_visible_speed = speed.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn field(config: MotionFieldConfig) -> MotionField {
        MotionField::new(ChipGeometry::new(128, 128, 18.5), &config)
    }

    /// Full-resolution pixel inside cell `(ix, iy)` for shift 3.
    fn px(ix: u32) -> u32 {
        (ix << 3) + 2
    }

    #[test]
    fn test_dimensions() {
        let f = field(MotionFieldConfig::default());
        assert_eq!(f.dimensions(), (17, 17));
        let mut f = f;
        f.set_subsample_shift(9);
        assert_eq!(f.subsample_shift(), 5);
        assert_eq!(f.dimensions(), (5, 5));
    }

    #[test]
    fn test_zero_size_geometry_is_inert() {
        let mut f = MotionField::new(ChipGeometry::new(0, 0, 18.5), &MotionFieldConfig::default());
        assert_eq!(f.dimensions(), (0, 0));
        assert_eq!(f.update(10, 0, 0, 1.0, 1.0, 1.4), FieldUpdate::OutOfRange);
        assert!(f.visible_cells().is_empty());
    }

    #[test]
    fn test_disabled() {
        let mut f = field(MotionFieldConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(f.update(10, 5, 5, 1.0, 0.0, 1.0), FieldUpdate::Disabled);
        assert!(f.last_update_timestamp_us().is_none());
    }

    #[test]
    fn test_first_update_replaces_then_blends() {
        let mut f = field(MotionFieldConfig::default());
        assert_eq!(f.update(0, px(4), px(4), 10.0, 0.0, 10.0), FieldUpdate::Replaced);
        assert_eq!(f.update(10, px(4), px(4), 20.0, 0.0, 20.0), FieldUpdate::Blended);
        let v = f.grid().flow_at(4, 4).unwrap();
        assert_relative_eq!(v.vx, 11.0, epsilon = 1e-12);
        assert_relative_eq!(f.grid().speed[f.grid().index(4, 4).unwrap()], 20.0);
    }

    #[test]
    fn test_blend_converges_monotonically() {
        let mut f = field(MotionFieldConfig::default());
        f.update(0, px(3), px(3), 0.0, 0.0, 0.0);
        let mut prev_err = f64::INFINITY;
        for k in 1..=100 {
            f.update(k * 10, px(3), px(3), 50.0, -20.0, 53.9);
            let v = f.grid().flow_at(3, 3).unwrap();
            let err = (v.vx - 50.0).hypot(v.vy + 20.0);
            assert!(err < prev_err);
            prev_err = err;
        }
        assert!(prev_err < 0.01 * 53.9);
    }

    #[test]
    fn test_neighbor_majority() {
        let config = MotionFieldConfig {
            consistent_with_neighbors: true,
            ..Default::default()
        };
        let mut f = field(config);
        // Seed neighbours of (5, 5): two pointing right, two pointing left.
        f.update(0, px(4), px(5), 10.0, 0.0, 10.0);
        f.update(0, px(6), px(5), 10.0, 0.0, 10.0);
        f.update(0, px(5), px(4), -10.0, 0.0, 10.0);
        f.update(0, px(5), px(6), -10.0, 0.0, 10.0);
        assert_eq!(
            f.update(1, px(5), px(5), 10.0, 0.0, 10.0),
            FieldUpdate::Rejected(FieldRejection::NeighborsInconsistent)
        );

        // Flip one neighbour so three of four agree.
        let mut f2 = field(MotionFieldConfig {
            consistent_with_neighbors: true,
            ..Default::default()
        });
        f2.update(0, px(4), px(5), 10.0, 0.0, 10.0);
        f2.update(0, px(6), px(5), 10.0, 0.0, 10.0);
        f2.update(0, px(5), px(4), 10.0, 0.0, 10.0);
        f2.update(0, px(5), px(6), -10.0, 0.0, 10.0);
        assert_eq!(f2.update(1, px(5), px(5), 10.0, 0.0, 10.0), FieldUpdate::Replaced);
    }

    #[test]
    fn test_corner_cell_has_two_neighbors() {
        let config = MotionFieldConfig {
            consistent_with_neighbors: true,
            ..Default::default()
        };
        let mut f = field(config.clone());
        f.update(0, px(1), px(0), -10.0, 0.0, 10.0);
        f.update(0, px(0), px(1), 10.0, 0.0, 10.0);
        assert_eq!(
            f.update(1, px(0), px(0), 10.0, 0.0, 10.0),
            FieldUpdate::Rejected(FieldRejection::NeighborsInconsistent)
        );

        let mut f = field(config);
        f.update(0, px(1), px(0), 10.0, 0.0, 10.0);
        f.update(0, px(0), px(1), 10.0, 0.0, 10.0);
        assert_eq!(f.update(1, px(0), px(0), 10.0, 0.0, 10.0), FieldUpdate::Replaced);
    }

    #[test]
    fn test_edge_cell_has_three_neighbors() {
        let config = MotionFieldConfig {
            consistent_with_neighbors: true,
            ..Default::default()
        };
        let mut f = field(config.clone());
        f.update(0, px(1), px(5), 10.0, 0.0, 10.0);
        f.update(0, px(0), px(4), -10.0, 0.0, 10.0);
        f.update(0, px(0), px(6), -10.0, 0.0, 10.0);
        assert_eq!(
            f.update(1, px(0), px(5), 10.0, 0.0, 10.0),
            FieldUpdate::Rejected(FieldRejection::NeighborsInconsistent)
        );

        let mut f = field(config);
        f.update(0, px(1), px(5), 10.0, 0.0, 10.0);
        f.update(0, px(0), px(4), 10.0, 0.0, 10.0);
        f.update(0, px(0), px(6), -10.0, 0.0, 10.0);
        assert_eq!(f.update(1, px(0), px(5), 10.0, 0.0, 10.0), FieldUpdate::Replaced);
    }

    #[test]
    fn test_current_angle_check() {
        let mut f = field(MotionFieldConfig {
            consistent_with_current_angle: true,
            ..Default::default()
        });
        f.update(0, px(2), px(2), 10.0, 0.0, 10.0);
        assert_eq!(
            f.update(5, px(2), px(2), -10.0, 1.0, 10.0),
            FieldUpdate::Rejected(FieldRejection::AngleInconsistent)
        );
        assert_eq!(f.update(6, px(2), px(2), 0.0, 10.0, 10.0), FieldUpdate::Blended);
    }

    #[test]
    fn test_aging() {
        let mut f = field(MotionFieldConfig {
            max_age_us: 1000,
            ..Default::default()
        });
        f.update(0, px(1), px(1), 5.0, 0.0, 5.0);
        assert_eq!(
            f.update(1001, px(1), px(1), 5.0, 0.0, 5.0),
            FieldUpdate::Rejected(FieldRejection::Stale)
        );
        // The stale cell was emptied; its timestamp was refreshed.
        assert_eq!(f.grid().flow_at(1, 1), Some(FlowVector::ZERO));
        assert_eq!(f.update(1500, px(1), px(1), 7.0, 0.0, 7.0), FieldUpdate::Replaced);
        assert_relative_eq!(f.grid().flow_at(1, 1).unwrap().vx, 7.0);

        f.update(0, px(2), px(2), 5.0, 0.0, 5.0);
        assert_eq!(f.update(999, px(2), px(2), 5.0, 0.0, 5.0), FieldUpdate::Blended);
    }

    #[test]
    fn test_angle_rejection_still_writes_timestamp() {
        let mut f = field(MotionFieldConfig {
            max_age_us: 1000,
            consistent_with_current_angle: true,
            ..Default::default()
        });
        f.update(0, px(1), px(1), 5.0, 0.0, 5.0);
        f.update(500, px(1), px(1), -5.0, 0.0, 5.0);
        let i = f.grid().index(1, 1).unwrap();
        assert_eq!(f.grid().last_ts[i], 500);
    }

    #[test]
    fn test_stale_rejection_refreshes_timestamp() {
        let mut f = field(MotionFieldConfig {
            max_age_us: 1000,
            ..Default::default()
        });
        f.update(0, px(1), px(1), 5.0, 0.0, 5.0);
        assert_eq!(
            f.update(1001, px(1), px(1), 5.0, 0.0, 5.0),
            FieldUpdate::Rejected(FieldRejection::Stale)
        );
        let i = f.grid().index(1, 1).unwrap();
        assert_eq!(f.grid().last_ts[i], 1001);
        assert!(f.grid().vacant[i]);
    }

    #[test]
    fn test_never_updated_cells_are_not_visible() {
        let mut f = field(MotionFieldConfig::default());
        f.set_min_visible_speed(0.0);
        f.update(0, px(1), px(1), 10.0, 0.0, 10.0);
        assert_eq!(f.visible_cells().len(), 1);

        f.reset();
        assert!(f.visible_cells().is_empty());
        assert!(f.snapshot().visible_cells().is_empty());
    }

    #[test]
    fn test_cell_center_is_mid_cell() {
        let mut f = field(MotionFieldConfig::default());
        assert_eq!(f.grid().cell_center(3, 1), (28.0, 12.0));
        f.set_subsample_shift(0);
        assert_eq!(f.grid().cell_center(7, 0), (7.5, 0.5));
    }

    #[test]
    fn test_visible_cells_exclude_stale_and_slow() {
        let mut f = field(MotionFieldConfig {
            max_age_us: 1000,
            ..Default::default()
        });
        f.update(0, px(1), px(1), 10.0, 0.0, 10.0);
        f.update(1500, px(2), px(2), 0.5, 0.0, 0.5);
        f.update(2000, px(3), px(3), 10.0, 0.0, 10.0);

        let cells = f.visible_cells();
        assert_eq!(cells.len(), 1);
        assert_eq!((cells[0].ix, cells[0].iy), (3, 3));
        assert_relative_eq!(cells[0].x, 28.0);
        assert_relative_eq!(cells[0].y, 28.0);

        let snapshot = f.snapshot();
        assert_eq!(snapshot.visible_cells(), cells);
    }

    #[test]
    fn test_reset_and_mixing_clamp() {
        let mut f = field(MotionFieldConfig::default());
        f.update(0, px(1), px(1), 10.0, 0.0, 10.0);
        f.reset();
        assert!(f.visible_cells().is_empty());
        assert!(f.last_update_timestamp_us().is_none());

        f.set_mixing_factor(0.0);
        assert_eq!(f.mixing_factor(), MIN_FIELD_MIXING_FACTOR);
        f.set_mixing_factor(3.0);
        assert_eq!(f.mixing_factor(), 1.0);
    }
}
