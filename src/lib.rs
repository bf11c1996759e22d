pub mod admission;
pub mod config;
pub mod event;
pub mod field;
pub mod geometry;
pub mod ground_truth;
pub mod imu;
pub mod io;
pub mod pipeline;
pub mod stats;
pub mod system;
