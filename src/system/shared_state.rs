//! Thread-safe front end to the pipeline.
//!
//! One packet or reconfiguration runs at a time under the processor lock.
//! After each, read-only snapshots of the motion field and statistics are
//! published for readers on other threads, and notifications are forwarded
//! without ever blocking the processing thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};

use super::messages::{PipelineEvent, ResetCause};
use crate::event::StreamItem;
use crate::field::FieldSnapshot;
use crate::pipeline::{FrameProcessor, PacketResult};
use crate::stats::StatisticsSummary;

/// Notifications buffered for subscribers before new ones are dropped.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

pub struct SharedPipeline {
    processor: Mutex<FrameProcessor>,

    /// Published after every packet; readers never touch live arrays.
    field: RwLock<Arc<FieldSnapshot>>,
    statistics: RwLock<Arc<StatisticsSummary>>,

    notify_tx: Sender<PipelineEvent>,
    notify_rx: Receiver<PipelineEvent>,
    dropped_notifications: AtomicU64,
}

impl SharedPipeline {
    pub fn new(processor: FrameProcessor) -> Arc<Self> {
        let (notify_tx, notify_rx) = bounded(NOTIFICATION_CHANNEL_CAPACITY);
        let field = Arc::new(processor.field_snapshot());
        let statistics = Arc::new(processor.statistics_summary());
        Arc::new(Self {
            processor: Mutex::new(processor),
            field: RwLock::new(field),
            statistics: RwLock::new(statistics),
            notify_tx,
            notify_rx,
            dropped_notifications: AtomicU64::new(0),
        })
    }

    pub fn process_packet(&self, items: &[StreamItem]) -> PacketResult {
        let mut processor = self.processor.lock();
        let result = processor.process_packet(items);
        self.publish(&processor, &result.notifications);
        result
    }

    /// Run `f` with exclusive access and forward the notifications it returns.
    ///
    /// Reallocating setters go through here so they can never overlap a packet.
    pub fn reconfigure<F>(&self, f: F) -> Vec<PipelineEvent>
    where
        F: FnOnce(&mut FrameProcessor) -> Vec<PipelineEvent>,
    {
        let mut processor = self.processor.lock();
        let events = f(&mut processor);
        self.publish(&processor, &events);
        events
    }

    pub fn reset(&self, cause: ResetCause) -> PipelineEvent {
        let mut processor = self.processor.lock();
        let event = processor.reset(cause);
        self.publish(&processor, std::slice::from_ref(&event));
        event
    }

    /// Latest published motion field.
    pub fn field_snapshot(&self) -> Arc<FieldSnapshot> {
        Arc::clone(&self.field.read())
    }

    /// Latest published statistics.
    pub fn statistics(&self) -> Arc<StatisticsSummary> {
        Arc::clone(&self.statistics.read())
    }

    /// Receiver for pipeline notifications. Receivers share one queue, so
    /// each notification goes to exactly one of them.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.notify_rx.clone()
    }

    /// Notifications lost because nobody drained the queue.
    pub fn dropped_notifications(&self) -> u64 {
        self.dropped_notifications.load(Ordering::Relaxed)
    }

    fn publish(&self, processor: &FrameProcessor, events: &[PipelineEvent]) {
        *self.field.write() = Arc::new(processor.field_snapshot());
        *self.statistics.write() = Arc::new(processor.statistics_summary());
        for event in events {
            match self.notify_tx.try_send(*event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                    self.dropped_notifications.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}
