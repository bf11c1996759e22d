//! Ground truth import errors.

use std::path::PathBuf;

use thiserror::Error;

pub type GroundTruthResult<T> = std::result::Result<T, GroundTruthError>;

#[derive(Error, Debug)]
pub enum GroundTruthError {
    /// A file could not be opened
    #[error("Failed to open {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV record
    #[error("CSV error in {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A cell is not a number
    #[error("Invalid number {value:?} in {path:?} at row {row}, column {column}")]
    Parse {
        path: PathBuf,
        row: usize,
        column: usize,
        value: String,
    },

    /// Rows of different length within one grid
    #[error("Ragged grid in {path:?}: row {row} has {found} columns, expected {expected}")]
    Ragged {
        path: PathBuf,
        row: usize,
        found: usize,
        expected: usize,
    },

    /// The vx and vy grids differ in size
    #[error("Shape mismatch: vx is {vx_rows}x{vx_cols}, vy is {vy_rows}x{vy_cols}")]
    ShapeMismatch {
        vx_rows: usize,
        vx_cols: usize,
        vy_rows: usize,
        vy_cols: usize,
    },

    /// A grid has no cells
    #[error("Ground truth grid is empty")]
    Empty,

    /// The validity window is missing or inverted
    #[error("Invalid ground truth time window: [{start}, {end})")]
    InvalidWindow { start: i64, end: i64 },

    /// The timestamp file does not hold exactly a start and an end
    #[error("Expected 2 timestamps in {path:?}, found {found}")]
    WindowFormat { path: PathBuf, found: usize },
}
