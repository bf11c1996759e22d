//! Plain-text event camera recordings.
//!
//! One item per line, `#` starts a comment:
//!
//! ```text
//! e,<timestamp_us>,<x>,<y>,<polarity>
//! i,<timestamp_us>,<pan_deg_s>,<tilt_deg_s>,<roll_deg_s>
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use csv::ReaderBuilder;

use crate::event::{EventRecord, Polarity, StreamItem};
use crate::imu::InertialSample;

#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub items: Vec<StreamItem>,
    pub num_events: usize,
    pub num_imu_samples: usize,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Timestamps of the first and last item.
    pub fn time_span_us(&self) -> Option<(i64, i64)> {
        let first = self.items.first()?.timestamp_us();
        let last = self.items.last()?.timestamp_us();
        Some((first, last))
    }
}

pub fn load_recording<P: AsRef<Path>>(csv_path: P) -> Result<Recording> {
    let csv_path = csv_path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let mut recording = Recording::default();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("Failed to read {}", csv_path.display()))?;
        if rec.len() < 5 {
            continue;
        }
        let ts: i64 = rec[1]
            .trim()
            .parse()
            .with_context(|| format!("Bad timestamp on record {}", line + 1))?;
        match rec[0].trim() {
            "e" => {
                let x: u16 = rec[2].trim().parse()?;
                let y: u16 = rec[3].trim().parse()?;
                let p: i64 = rec[4].trim().parse()?;
                recording
                    .items
                    .push(EventRecord::new(x, y, ts, Polarity::from_raw(p)).into());
                recording.num_events += 1;
            }
            "i" => {
                let pan: f64 = rec[2].trim().parse()?;
                let tilt: f64 = rec[3].trim().parse()?;
                let roll: f64 = rec[4].trim().parse()?;
                recording
                    .items
                    .push(InertialSample::new(ts, pan, tilt, roll).into());
                recording.num_imu_samples += 1;
            }
            other => bail!("Unknown record type {:?} on record {}", other, line + 1),
        }
    }
    Ok(recording)
}
