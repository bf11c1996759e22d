//! Subsampled timestamp and occupancy map used to admit events.
//!
//! Each event is checked, in order, against:
//! 1. the border required by the upstream flow algorithm
//! 2. the configured processing window
//! 3. the per-packet occupancy bitmap (only when subsampling; set by admitted events)
//! 4. the last timestamp seen at the same address and type (refractory period)
//!
//! A timestamp older than the stored one means the stream went backwards.
//! That is reported to the owner as [`Admission::ResetRequired`] rather than
//! being reordered or silently dropped.

/// Why an event was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// Inside the search margin or outside the map.
    OutOfBounds,
    /// Outside the `[x_min, x_max) x [y_min, y_max)` window.
    OutsideWindow,
    /// The subsampled cell already received an event in this packet.
    AlreadySetThisPacket,
    /// Within the refractory period of the previous event at this address.
    TooSoon,
}

/// Admission decision for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
    /// The timestamp is older than the last one stored at this address.
    ResetRequired {
        timestamp_us: i64,
        last_timestamp_us: i64,
    },
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

/// Processing window in subsampled pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl Window {
    pub fn unbounded() -> Self {
        Self {
            x_min: 0,
            x_max: u32::MAX,
            y_min: 0,
            y_max: u32::MAX,
        }
    }

    #[inline]
    fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_min as usize
            && x < self.x_max as usize
            && y >= self.y_min as usize
            && y < self.y_max as usize
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Sentinel for "no event seen yet" so the first event always passes.
const NEVER: i64 = i64::MIN;

pub struct SpatialIndexMap {
    width: usize,
    height: usize,
    num_types: usize,
    subsample_shift: u32,
    refractory_period_us: i64,
    window: Window,
    /// Indexed `[(y * width + x) * num_types + type]`.
    last_timestamps: Vec<i64>,
    /// Indexed `[y * width + x]`; cleared once per packet.
    occupied: Vec<bool>,
}

impl SpatialIndexMap {
    /// Create a map for a `width x height` subsampled grid.
    pub fn new(
        width: usize,
        height: usize,
        num_types: usize,
        subsample_shift: u32,
        refractory_period_us: i64,
    ) -> Self {
        let mut map = Self {
            width: 0,
            height: 0,
            num_types: num_types.max(1),
            subsample_shift,
            refractory_period_us: refractory_period_us.max(0),
            window: Window::unbounded(),
            last_timestamps: Vec::new(),
            occupied: Vec::new(),
        };
        map.resize(width, height, subsample_shift);
        map
    }

    /// Reallocate for new dimensions. All history is lost.
    pub fn resize(&mut self, width: usize, height: usize, subsample_shift: u32) {
        let cells = width.saturating_mul(height);
        self.width = width;
        self.height = height;
        self.subsample_shift = subsample_shift;
        self.last_timestamps = vec![NEVER; cells.saturating_mul(self.num_types)];
        self.occupied = vec![false; cells];
    }

    /// Forget all history without reallocating.
    pub fn clear(&mut self) {
        self.last_timestamps.fill(NEVER);
        self.occupied.fill(false);
    }

    /// Start a new packet.
    pub fn begin_packet(&mut self) {
        if self.subsample_shift > 0 {
            self.occupied.fill(false);
        }
    }

    /// Decide whether the event at subsampled `(x, y)` is processed.
    ///
    /// `margin` is the border the upstream algorithm needs around the event.
    pub fn admit(
        &mut self,
        x: usize,
        y: usize,
        event_type: usize,
        timestamp_us: i64,
        margin: usize,
    ) -> Admission {
        if x < margin
            || y < margin
            || x + margin >= self.width
            || y + margin >= self.height
            || event_type >= self.num_types
        {
            return Admission::Rejected(RejectReason::OutOfBounds);
        }
        if !self.window.contains(x, y) {
            return Admission::Rejected(RejectReason::OutsideWindow);
        }

        let cell = y * self.width + x;
        let subsampling = self.subsample_shift > 0;
        if subsampling && self.occupied[cell] {
            return Admission::Rejected(RejectReason::AlreadySetThisPacket);
        }

        let slot = cell * self.num_types + event_type;
        let last = self.last_timestamps[slot];
        if timestamp_us < last {
            return Admission::ResetRequired {
                timestamp_us,
                last_timestamp_us: last,
            };
        }
        self.last_timestamps[slot] = timestamp_us;

        if timestamp_us < last.saturating_add(self.refractory_period_us) {
            return Admission::Rejected(RejectReason::TooSoon);
        }
        // Only an admitted event claims the cell for this packet.
        if subsampling {
            self.occupied[cell] = true;
        }
        Admission::Accepted
    }

    /// Last admitted-or-refractory timestamp at a subsampled address.
    pub fn last_timestamp(&self, x: usize, y: usize, event_type: usize) -> Option<i64> {
        if x >= self.width || y >= self.height || event_type >= self.num_types {
            return None;
        }
        let ts = self.last_timestamps[(y * self.width + x) * self.num_types + event_type];
        (ts != NEVER).then_some(ts)
    }

    pub fn set_refractory_period_us(&mut self, period_us: i64) {
        self.refractory_period_us = period_us.max(0);
    }

    pub fn refractory_period_us(&self) -> i64 {
        self.refractory_period_us
    }

    pub fn set_window(&mut self, window: Window) {
        self.window = window;
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn subsample_shift(&self) -> u32 {
        self.subsample_shift
    }

    pub fn num_types(&self) -> usize {
        self.num_types
    }
}
