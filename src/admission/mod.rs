//! Event admission: bounds, window, per-packet dedup and refractory filtering.

pub mod spatial_index;

pub use spatial_index::{Admission, RejectReason, SpatialIndexMap, Window};
