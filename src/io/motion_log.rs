//! Asynchronous per-event text log.
//!
//! Lines are handed to a writer thread over a bounded channel. When the
//! writer falls behind, lines are dropped and counted instead of stalling
//! the caller.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{info, warn};

use crate::event::MotionEvent;

/// Lines buffered between the caller and the writer thread.
pub const DEFAULT_LOG_CAPACITY: usize = 65_536;

pub const MOTION_LOG_HEADER: &str = "# timestamp x y type vx vy speed valid";

/// Receives every motion event the pipeline emits.
pub trait MotionEventSink {
    fn record(&mut self, event: &MotionEvent);
}

impl MotionEventSink for Vec<MotionEvent> {
    fn record(&mut self, event: &MotionEvent) {
        self.push(*event);
    }
}

pub struct MotionVectorLogger {
    path: PathBuf,
    sender: Option<Sender<String>>,
    writer_handle: Option<JoinHandle<Result<u64>>>,
    dropped: u64,
}

impl MotionVectorLogger {
    pub fn create<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", MOTION_LOG_HEADER)?;

        let (sender, receiver) = bounded::<String>(capacity.max(1));
        let writer_handle = Self::spawn_writer(writer, receiver);
        info!("Motion vector log opened at {:?}", path);

        Ok(Self {
            path,
            sender: Some(sender),
            writer_handle: Some(writer_handle),
            dropped: 0,
        })
    }

    fn spawn_writer(mut writer: BufWriter<File>, receiver: Receiver<String>) -> JoinHandle<Result<u64>> {
        thread::spawn(move || {
            let mut written = 0u64;
            // Ends when every sender is gone.
            for line in receiver {
                writeln!(writer, "{}", line)?;
                written += 1;
            }
            writer.flush()?;
            Ok(written)
        })
    }

    /// Queue one line. Returns false if it was dropped.
    pub fn log(&mut self, line: String) -> bool {
        let Some(sender) = &self.sender else {
            self.dropped += 1;
            return false;
        };
        match sender.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Lines lost to back-pressure so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush everything queued and stop the writer. Returns the number of lines written.
    pub fn close(mut self) -> Result<u64> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<u64> {
        self.sender.take();
        let Some(handle) = self.writer_handle.take() else {
            return Ok(0);
        };
        let written = handle
            .join()
            .map_err(|_| anyhow!("Motion vector writer thread panicked"))??;
        if self.dropped > 0 {
            warn!(
                "Motion vector log {:?}: {} lines dropped under back-pressure",
                self.path, self.dropped
            );
        }
        info!("Motion vector log closed: {} lines written to {:?}", written, self.path);
        Ok(written)
    }
}

impl MotionEventSink for MotionVectorLogger {
    fn record(&mut self, event: &MotionEvent) {
        self.log(event.to_string());
    }
}

impl Drop for MotionVectorLogger {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Motion vector log {:?} not closed cleanly: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::event::{EventRecord, FlowVector, Polarity};

    #[test]
    fn test_writes_header_and_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.txt");
        let mut logger = MotionVectorLogger::create(&path, 16).unwrap();

        let ev = EventRecord::new(3, 4, 1234, Polarity::On);
        logger.record(&MotionEvent::new(&ev, 3, 4, Some(FlowVector::new(3.0, 4.0))));
        logger.record(&MotionEvent::new(&ev, 3, 4, None));
        assert_eq!(logger.close().unwrap(), 2);

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], MOTION_LOG_HEADER);
        assert_eq!(lines[1], "1234 3 4 1 3.000 4.000 5.000 1");
        assert_eq!(lines[2], "1234 3 4 1 0.000 0.000 0.000 0");
    }

    #[test]
    fn test_written_plus_dropped_accounts_for_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.txt");
        let mut logger = MotionVectorLogger::create(&path, 1).unwrap();
        let mut accepted = 0u64;
        for i in 0..1000 {
            if logger.log(format!("line {}", i)) {
                accepted += 1;
            }
        }
        let dropped = logger.dropped();
        let written = logger.close().unwrap();
        assert_eq!(written, accepted);
        assert_eq!(written + dropped, 1000);
    }

    #[test]
    fn test_create_in_missing_dir_fails() {
        assert!(MotionVectorLogger::create("/nonexistent/dir/motion.txt", 4).is_err());
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<MotionEvent> = Vec::new();
        let ev = EventRecord::new(1, 2, 3, Polarity::Off);
        sink.record(&MotionEvent::new(&ev, 1, 2, None));
        assert_eq!(sink.len(), 1);
    }
}
