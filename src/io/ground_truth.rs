//! Ground truth flow fields stored as CSV grids.
//!
//! A ground truth directory holds:
//! - `vx.csv` and `vy.csv`: one row per pixel row, one column per pixel column
//! - `ts.csv`: the start and end of the validity window in microseconds

use std::path::{Path, PathBuf};

use csv::ReaderBuilder;

use crate::ground_truth::{GroundTruthError, GroundTruthResult, GroundTruthTable};

pub const VX_FILE: &str = "vx.csv";
pub const VY_FILE: &str = "vy.csv";
pub const TS_FILE: &str = "ts.csv";

/// Load and validate a complete table. Nothing is returned on partial success.
pub fn load_ground_truth_dir<P: AsRef<Path>>(dir: P) -> GroundTruthResult<GroundTruthTable> {
    let dir = dir.as_ref();
    let vx = load_grid(&dir.join(VX_FILE))?;
    let vy = load_grid(&dir.join(VY_FILE))?;

    let ts_path = dir.join(TS_FILE);
    let ts: Vec<f64> = load_grid(&ts_path)?.into_iter().flatten().collect();
    if ts.len() != 2 {
        return Err(GroundTruthError::WindowFormat {
            path: ts_path,
            found: ts.len(),
        });
    }
    GroundTruthTable::from_grids(vx, vy, ts[0] as i64, ts[1] as i64)
}

/// Read a rectangular grid of numbers.
pub fn load_grid(path: &Path) -> GroundTruthResult<Vec<Vec<f64>>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| open_error(path, e))?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (row, rec) in rdr.records().enumerate() {
        let rec = rec.map_err(|source| GroundTruthError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let values = rec
            .iter()
            .enumerate()
            .filter(|(_, field)| !field.is_empty())
            .map(|(column, field)| {
                field.parse::<f64>().map_err(|_| GroundTruthError::Parse {
                    path: path.to_path_buf(),
                    row,
                    column,
                    value: field.to_string(),
                })
            })
            .collect::<GroundTruthResult<Vec<f64>>>()?;
        if values.is_empty() {
            continue;
        }
        if let Some(first) = rows.first() {
            if values.len() != first.len() {
                return Err(GroundTruthError::Ragged {
                    path: path.to_path_buf(),
                    row,
                    found: values.len(),
                    expected: first.len(),
                });
            }
        }
        rows.push(values);
    }
    Ok(rows)
}

fn open_error(path: &Path, err: csv::Error) -> GroundTruthError {
    let path: PathBuf = path.to_path_buf();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => GroundTruthError::Io { path, source },
        kind => GroundTruthError::Csv {
            path,
            source: csv::Error::from(std::io::Error::other(format!("{:?}", kind))),
        },
    }
}
