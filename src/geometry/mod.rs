//! Geometry utilities: sensor geometry and image-plane transforms.

pub mod chip;
pub mod rigid;

pub use chip::{ChipGeometry, MAX_SENSOR_DIM};
pub use rigid::Rigid2;
