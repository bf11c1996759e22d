//! Per-packet orchestration of admission, flow, gating, aggregation and statistics.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::algorithm::{FlowAlgorithm, FlowContext};
use super::result::PacketResult;
use crate::admission::{Admission, SpatialIndexMap, Window};
use crate::config::{FlowConfig, MAX_SUBSAMPLE_SHIFT, StatisticsConfig};
use crate::event::{EventRecord, MotionEvent, Polarity, StreamItem};
use crate::field::{FieldSnapshot, MotionField};
use crate::geometry::ChipGeometry;
use crate::ground_truth::{GroundTruthSource, GroundTruthTable};
use crate::imu::{ImuFlowEstimator, ImuState, TransformUpdate};
use crate::io::MotionEventSink;
use crate::stats::{FlowStatistics, StatisticsSummary};
use crate::system::{PipelineEvent, ResetCause};

/// Owns every engine of the pipeline and runs packets through them in order.
pub struct FrameProcessor {
    config: FlowConfig,
    admission: SpatialIndexMap,
    imu: ImuFlowEstimator,
    field: MotionField,
    statistics: FlowStatistics,
    ground_truth: GroundTruthSource,
    algorithm: Box<dyn FlowAlgorithm + Send>,
    sink: Option<Box<dyn MotionEventSink + Send>>,
    packets: u64,
    /// Statistics reported just before the last rewind or timestamp reset.
    statistics_before_reset: Option<StatisticsSummary>,
}

impl FrameProcessor {
    pub fn new(config: FlowConfig, algorithm: Box<dyn FlowAlgorithm + Send>) -> Self {
        let mut config = config;
        config.subsample_shift = config.subsample_shift.min(MAX_SUBSAMPLE_SHIFT);

        let (w, h) = config.chip.subsampled(config.subsample_shift);
        let mut admission = SpatialIndexMap::new(
            w,
            h,
            Polarity::COUNT,
            config.subsample_shift,
            config.refractory_period_us,
        );
        admission.set_window(window_of(&config));

        let imu = ImuFlowEstimator::new(config.chip, &config.imu);
        let field = MotionField::new(config.chip, &config.field);
        config.field = field.config().clone();
        let statistics = FlowStatistics::new(&config);

        info!(
            "Flow pipeline ready: {}x{} chip, subsample shift {}, field shift {}, algorithm {}",
            config.chip.width,
            config.chip.height,
            config.subsample_shift,
            config.field.subsample_shift,
            algorithm.name()
        );

        Self {
            config,
            admission,
            imu,
            field,
            statistics,
            ground_truth: GroundTruthSource::default(),
            algorithm,
            sink: None,
            packets: 0,
            statistics_before_reset: None,
        }
    }

    /// Run one packet. Never fails; problems are reported through the result.
    pub fn process_packet(&mut self, items: &[StreamItem]) -> PacketResult {
        let start = Instant::now();
        let mut result = PacketResult::default();
        self.admission.begin_packet();

        for item in items {
            match item {
                StreamItem::Inertial(sample) => {
                    result.counters.imu_samples += 1;
                    if let TransformUpdate::CalibrationFinished(offsets) = self.imu.update_transform(sample) {
                        result.notifications.push(PipelineEvent::Recalibrated(offsets));
                    }
                }
                StreamItem::Event(event) => self.process_event(event, &mut result),
            }
        }

        let elapsed_us = start.elapsed().as_secs_f64() * 1e6;
        result.elapsed_us = elapsed_us;
        result.global_motion = self.statistics.finish_packet(elapsed_us, result.counters.admitted);
        self.packets += 1;
        debug!("Packet {}: {}", self.packets, result.counters);
        result
    }

    fn process_event(&mut self, event: &EventRecord, result: &mut PacketResult) {
        result.counters.events_in += 1;
        let shift = self.config.subsample_shift;
        let x = usize::from(event.x) >> shift;
        let y = usize::from(event.y) >> shift;
        let margin = (self.config.search_margin as usize).max(self.algorithm.search_distance());

        match self
            .admission
            .admit(x, y, event.polarity.index(), event.timestamp_us, margin)
        {
            Admission::Accepted => {}
            Admission::Rejected(reason) => {
                result.counters.count_rejection(reason);
                return;
            }
            Admission::ResetRequired {
                timestamp_us,
                last_timestamp_us,
            } => {
                warn!(
                    "Non-monotonic timestamp {} < {} at ({}, {}), resetting",
                    timestamp_us, last_timestamp_us, event.x, event.y
                );
                result.counters.non_monotonic += 1;
                let cause = ResetCause::NonMonotonicTimestamp {
                    timestamp_us,
                    last_timestamp_us,
                };
                result.notifications.push(self.reset(cause));
                return;
            }
        }
        result.counters.admitted += 1;

        let ctx = FlowContext {
            x,
            y,
            subsample_shift: shift,
            timestamps: &self.admission,
            imu: &self.imu,
        };
        let flow = self
            .algorithm
            .compute_flow(event, &ctx)
            .filter(|f| f.is_finite());

        let out_x = (x << shift) as u16;
        let out_y = (y << shift) as u16;
        let mut out = MotionEvent::new(event, out_x, out_y, flow);

        if out.has_direction {
            result.counters.with_flow += 1;
            let measured = out.flow();
            let reference = self.ground_truth.reference(
                &self.imu,
                usize::from(event.x),
                usize::from(event.y),
                event.timestamp_us,
            );
            if self.statistics.accuracy_tests(measured, reference) {
                out.outlier = true;
                result.counters.outliers += 1;
            } else {
                self.statistics.record_accuracy(measured, reference);
                self.statistics
                    .record_global_motion(f64::from(out_x), f64::from(out_y), measured);
                let update = self.field.update(
                    event.timestamp_us,
                    u32::from(out_x),
                    u32::from(out_y),
                    out.vx,
                    out.vy,
                    out.speed,
                );
                result.counters.count_field_update(update);
            }
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.record(&out);
        }
        result.events.push(out);
    }

    /// Clear every engine's history. Offsets, ground truth and settings survive.
    ///
    /// A rewind or non-monotonic reset reports the accumulated statistics first
    /// when accuracy or processing time is being measured.
    pub fn reset(&mut self, cause: ResetCause) -> PipelineEvent {
        let stream_restart = matches!(
            cause,
            ResetCause::Rewind | ResetCause::NonMonotonicTimestamp { .. }
        );
        let measuring = self.config.statistics.measure_accuracy
            || self.config.statistics.measure_processing_time;
        if stream_restart && measuring {
            let summary = self.statistics_summary();
            info!("Statistics before reset:\n{}", summary);
            self.statistics_before_reset = Some(summary);
        }

        self.admission.clear();
        self.imu.reset();
        self.field.reset();
        self.statistics.reset();
        self.algorithm.reset();
        info!("Pipeline reset: {:?}", cause);
        PipelineEvent::Reset(cause)
    }

    pub fn rewind(&mut self) -> PipelineEvent {
        self.reset(ResetCause::Rewind)
    }

    /// Rebuild all geometry-dependent arrays for a new chip.
    pub fn resize(&mut self, chip: ChipGeometry) -> Vec<PipelineEvent> {
        self.config.chip = chip;
        self.rebuild()
    }

    pub fn set_subsample_shift(&mut self, shift: u32) -> Vec<PipelineEvent> {
        let clamped = shift.min(MAX_SUBSAMPLE_SHIFT);
        if clamped != shift {
            debug!("subsample shift {} clamped to {}", shift, clamped);
        }
        self.config.subsample_shift = clamped;
        self.rebuild()
    }

    pub fn set_field_subsample_shift(&mut self, shift: u32) -> Vec<PipelineEvent> {
        self.field.set_subsample_shift(shift);
        self.config.field.subsample_shift = self.field.subsample_shift();
        self.rebuild()
    }

    fn rebuild(&mut self) -> Vec<PipelineEvent> {
        let chip = self.config.chip;
        let shift = self.config.subsample_shift;
        let (w, h) = chip.subsampled(shift);
        self.admission.resize(w, h, shift);
        self.imu.set_geometry(chip);
        self.field.resize(chip);
        self.statistics.set_center(chip.center());

        let resized = PipelineEvent::Resized {
            width: chip.width,
            height: chip.height,
            subsample_shift: shift,
            field_subsample_shift: self.config.field.subsample_shift,
        };
        info!(
            "Pipeline resized: {}x{} chip, subsample shift {}, field shift {}",
            chip.width, chip.height, shift, self.config.field.subsample_shift
        );
        vec![resized, self.reset(ResetCause::GeometryChanged)]
    }

    pub fn set_refractory_period_us(&mut self, period_us: i64) {
        self.admission.set_refractory_period_us(period_us);
        self.config.refractory_period_us = self.admission.refractory_period_us();
    }

    /// Restrict processing to `[x_min, x_max) x [y_min, y_max)` in subsampled pixels.
    pub fn set_window(&mut self, x_min: u32, x_max: u32, y_min: u32, y_max: u32) {
        self.config.x_min = x_min;
        self.config.x_max = x_max.max(x_min);
        self.config.y_min = y_min;
        self.config.y_max = y_max.max(y_min);
        self.admission.set_window(window_of(&self.config));
    }

    pub fn set_search_margin(&mut self, margin: u32) {
        self.config.search_margin = margin;
    }

    pub fn set_speed_control(&mut self, enabled: bool, mixing_factor: f64, reject_factor: f64) {
        let mixing_factor = if mixing_factor > 0.0 { mixing_factor.min(1.0) } else { 1e-3 };
        self.config.speed_control_enabled = enabled;
        self.config.speed_mixing_factor = mixing_factor;
        self.config.excess_speed_reject_factor = reject_factor;
        self.statistics
            .set_speed_control(enabled, mixing_factor, reject_factor);
    }

    /// Changing what is measured starts the statistics over.
    pub fn set_statistics_config(&mut self, config: StatisticsConfig) {
        self.config.statistics = config.clone();
        self.statistics.set_config(config);
        self.statistics.reset();
    }

    pub fn set_field_enabled(&mut self, enabled: bool) {
        self.field.set_enabled(enabled);
        self.config.field.enabled = enabled;
    }

    pub fn set_field_mixing_factor(&mut self, factor: f64) {
        self.field.set_mixing_factor(factor);
        self.config.field.mixing_factor = self.field.mixing_factor();
    }

    pub fn set_field_max_age_us(&mut self, max_age_us: i64) {
        self.field.set_max_age_us(max_age_us);
        self.config.field.max_age_us = self.field.config().max_age_us;
    }

    pub fn set_field_consistency(&mut self, with_neighbors: bool, with_current_angle: bool) {
        self.field.set_consistent_with_neighbors(with_neighbors);
        self.field.set_consistent_with_current_angle(with_current_angle);
        self.config.field.consistent_with_neighbors = with_neighbors;
        self.config.field.consistent_with_current_angle = with_current_angle;
    }

    pub fn set_lens_focal_length_mm(&mut self, focal_length_mm: f64) {
        if !(focal_length_mm > 0.0) {
            debug!("ignoring non-positive focal length {}", focal_length_mm);
            return;
        }
        self.imu.set_lens_focal_length_mm(focal_length_mm);
        self.config.imu.lens_focal_length_mm = focal_length_mm;
    }

    pub fn set_calibration_sample_count(&mut self, count: u32) {
        self.imu.set_calibration_sample_count(count);
        self.config.imu.calibration_sample_count = count.max(1);
    }

    pub fn start_imu_calibration(&mut self) {
        self.imu.start_calibration();
    }

    pub fn reset_imu_calibration(&mut self) {
        self.imu.reset_calibration();
        self.config.imu.offsets = self.imu.offsets();
    }

    pub fn import_ground_truth(&mut self, table: GroundTruthTable) {
        self.ground_truth.import(table);
    }

    pub fn reset_ground_truth(&mut self) {
        self.ground_truth.reset();
    }

    /// Install a sink that sees every emitted event. Returns the previous one.
    pub fn set_sink(
        &mut self,
        sink: Option<Box<dyn MotionEventSink + Send>>,
    ) -> Option<Box<dyn MotionEventSink + Send>> {
        std::mem::replace(&mut self.sink, sink)
    }

    pub fn set_algorithm(&mut self, algorithm: Box<dyn FlowAlgorithm + Send>) {
        info!("Flow algorithm set to {}", algorithm.name());
        self.algorithm = algorithm;
    }

    pub fn statistics_summary(&self) -> StatisticsSummary {
        self.statistics.summary(self.imu.is_calibration_set())
    }

    pub fn field_snapshot(&self) -> FieldSnapshot {
        self.field.snapshot()
    }

    /// Summary reported at the last rewind or non-monotonic reset, if any.
    pub fn statistics_before_reset(&self) -> Option<&StatisticsSummary> {
        self.statistics_before_reset.as_ref()
    }

    /// Current settings, including any runtime changes and calibrated offsets.
    pub fn config(&self) -> FlowConfig {
        let mut config = self.config.clone();
        config.imu.offsets = self.imu.offsets();
        config
    }

    pub fn imu_state(&self) -> ImuState {
        self.imu.state()
    }

    pub fn imu(&self) -> &ImuFlowEstimator {
        &self.imu
    }

    pub fn field(&self) -> &MotionField {
        &self.field
    }

    pub fn admission(&self) -> &SpatialIndexMap {
        &self.admission
    }

    pub fn ground_truth(&self) -> &GroundTruthSource {
        &self.ground_truth
    }

    pub fn packets_processed(&self) -> u64 {
        self.packets
    }
}

fn window_of(config: &FlowConfig) -> Window {
    Window {
        x_min: config.x_min,
        x_max: config.x_max,
        y_min: config.y_min,
        y_max: config.y_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use parking_lot::Mutex;

    use crate::event::FlowVector;
    use crate::imu::{GyroOffsets, InertialSample};
    use crate::pipeline::ImuFlowAlgorithm;

    fn chip128() -> ChipGeometry {
        ChipGeometry::new(128, 128, 18.5)
    }

    fn config128() -> FlowConfig {
        FlowConfig {
            chip: chip128(),
            ..Default::default()
        }
    }

    fn constant_flow(vx: f64, vy: f64) -> Box<dyn FlowAlgorithm + Send> {
        Box::new(move |_: &EventRecord, _: &FlowContext<'_>| Some(FlowVector::new(vx, vy)))
    }

    fn ev(x: u16, y: u16, ts: i64) -> StreamItem {
        EventRecord::new(x, y, ts, Polarity::On).into()
    }

    struct SharedSink(Arc<Mutex<Vec<MotionEvent>>>);

    impl MotionEventSink for SharedSink {
        fn record(&mut self, event: &MotionEvent) {
            self.0.lock().push(*event);
        }
    }

    #[test]
    fn test_end_to_end_constant_flow() {
        let mut p = FrameProcessor::new(config128(), constant_flow(50.0, 0.0));
        assert_eq!(p.field().dimensions(), (17, 17));

        // Cycle through a 4x4 block of cells, a different pixel each time.
        let mut items = Vec::new();
        for i in 0..1000u16 {
            let cell = i % 16;
            let offset = (i / 16) % 8;
            let x = 32 + (cell % 4) * 8 + offset;
            let y = 32 + (cell / 4) * 8 + (i / 128) % 8;
            items.push(ev(x, y, 10 * i64::from(i)));
        }
        let mut admitted = 0;
        for packet in crate::event::chunk_packets(&items, 128) {
            let result = p.process_packet(packet);
            assert!(result.notifications.is_empty());
            admitted += result.counters.admitted;
        }
        assert_eq!(admitted, 1000);

        let cells = p.field_snapshot().visible_cells();
        assert_eq!(cells.len(), 16);
        for cell in cells {
            assert!((cell.vx - 50.0).abs() <= 0.05 * 50.0);
            assert!(cell.vy.abs() <= 0.05 * 50.0);
        }
    }

    #[test]
    fn test_non_monotonic_resets_and_continues() {
        let mut p = FrameProcessor::new(config128(), constant_flow(10.0, 0.0));
        let result = p.process_packet(&[ev(10, 10, 100), ev(10, 10, 50), ev(11, 10, 60)]);
        assert_eq!(
            result.notifications,
            vec![PipelineEvent::Reset(ResetCause::NonMonotonicTimestamp {
                timestamp_us: 50,
                last_timestamp_us: 100
            })]
        );
        assert_eq!(result.counters.non_monotonic, 1);
        assert_eq!(result.counters.admitted, 2);
        assert_eq!(result.events.len(), 2);
        assert_eq!(result.events[1].timestamp_us, 60);
        // The reset cleared the offending address.
        assert_eq!(p.admission().last_timestamp(10, 10, 1), None);
    }

    #[test]
    fn test_subsampled_dedup_per_packet() {
        let mut config = config128();
        config.subsample_shift = 2;
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let result = p.process_packet(&[ev(40, 40, 100), ev(41, 42, 101), ev(44, 40, 102)]);
        assert_eq!(result.counters.admitted, 2);
        assert_eq!(result.counters.already_set, 1);
        assert_eq!((result.events[0].x, result.events[0].y), (40, 40));
        assert_eq!((result.events[1].x, result.events[1].y), (44, 40));

        let result = p.process_packet(&[ev(41, 42, 200)]);
        assert_eq!(result.counters.admitted, 1);
    }

    #[test]
    fn test_refractory_and_window_counted() {
        let mut config = config128();
        config.refractory_period_us = 1000;
        config.x_min = 20;
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let result = p.process_packet(&[ev(30, 30, 0), ev(30, 30, 500), ev(10, 30, 600), ev(30, 30, 1600)]);
        assert_eq!(result.counters.admitted, 2);
        assert_eq!(result.counters.too_soon, 1);
        assert_eq!(result.counters.outside_window, 1);
    }

    #[test]
    fn test_margin_from_algorithm() {
        struct Wide;
        impl FlowAlgorithm for Wide {
            fn compute_flow(&mut self, _: &EventRecord, _: &FlowContext<'_>) -> Option<FlowVector> {
                Some(FlowVector::new(1.0, 1.0))
            }
            fn search_distance(&self) -> usize {
                5
            }
        }
        let mut p = FrameProcessor::new(config128(), Box::new(Wide));
        let result = p.process_packet(&[ev(4, 50, 1), ev(5, 50, 2), ev(123, 50, 3)]);
        assert_eq!(result.counters.out_of_bounds, 2);
        assert_eq!(result.counters.admitted, 1);
    }

    #[test]
    fn test_speeders_are_flagged_and_kept_out_of_field() {
        let mut config = config128();
        config.speed_control_enabled = true;
        config.speed_mixing_factor = 0.1;
        let speeds = Arc::new(Mutex::new(vec![10.0; 50]));
        speeds.lock().push(500.0);
        let feed = Arc::clone(&speeds);
        let mut idx = 0usize;
        let algorithm = move |_: &EventRecord, _: &FlowContext<'_>| {
            let v = feed.lock()[idx];
            idx += 1;
            Some(FlowVector::new(v, 0.0))
        };
        let mut p = FrameProcessor::new(config, Box::new(algorithm));
        let items: Vec<StreamItem> = (0..51).map(|i| ev(20 + (i % 40) as u16, 20, i64::from(i) * 10)).collect();
        let result = p.process_packet(&items);
        // The average starts at zero, so the first few events are speeders too.
        assert!(result.events[0].outlier);
        assert!(!result.events[40].outlier);
        let last = result.events.last().unwrap();
        assert!(last.outlier);
        assert_eq!(last.speed, 500.0);
        assert!(p.field().visible_cells().iter().all(|c| c.speed < 500.0));
    }

    #[test]
    fn test_imu_calibration_through_packets() {
        let mut config = config128();
        config.imu.calibration_sample_count = 3;
        config.imu.offsets = GyroOffsets::zero();
        let mut p = FrameProcessor::new(config, Box::new(ImuFlowAlgorithm));
        assert!(!p.statistics_summary().calibration_set);

        p.start_imu_calibration();
        let items: Vec<StreamItem> = (0..6)
            .map(|i| InertialSample::new(i * 1000, 1.0, 2.0, 3.0).into())
            .collect();
        let result = p.process_packet(&items);
        assert_eq!(result.counters.imu_samples, 6);
        match result.notifications.as_slice() {
            [PipelineEvent::Recalibrated(offsets)] => {
                assert_relative_eq!(offsets.pan, 1.0);
                assert_relative_eq!(offsets.tilt, 2.0);
                assert_relative_eq!(offsets.roll, 3.0);
            }
            other => panic!("expected one recalibration, got {:?}", other),
        }
        assert!(p.statistics_summary().calibration_set);
        assert_eq!(p.config().imu.offsets, p.imu().offsets());

        p.reset_imu_calibration();
        assert!(!p.statistics_summary().calibration_set);
    }

    #[test]
    fn test_imu_flow_events_after_rotation() {
        let mut config = config128();
        config.imu.offsets = GyroOffsets::zero();
        let mut p = FrameProcessor::new(config, Box::new(ImuFlowAlgorithm));
        let result = p.process_packet(&[
            InertialSample::new(0, 0.0, 0.0, 0.0).into(),
            InertialSample::new(1_000, 0.0, 0.0, 0.0).into(),
            ev(64, 64, 1_500),
            InertialSample::new(2_000, 20.0, 0.0, 0.0).into(),
            ev(70, 64, 2_500),
        ]);
        assert_eq!(result.events.len(), 2);
        assert!(!result.events[0].has_direction);
        assert!(result.events[1].has_direction);
        assert!(result.events[1].vx < 0.0);
    }

    #[test]
    fn test_accuracy_against_imported_ground_truth() {
        let mut config = config128();
        config.statistics.measure_accuracy = true;
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let grid = |v: f64| vec![vec![v; 128]; 128];
        p.import_ground_truth(GroundTruthTable::from_grids(grid(10.0), grid(0.0), 0, 1_000_000).unwrap());
        p.process_packet(&[ev(10, 10, 100), ev(20, 20, 200), ev(30, 30, 300)]);

        let summary = p.statistics_summary();
        assert_eq!(summary.angular_error_deg.count(), 3);
        assert_relative_eq!(summary.angular_error_deg.mean().unwrap(), 0.0);
        assert_relative_eq!(summary.endpoint_error_abs.mean().unwrap(), 0.0);

        p.reset(ResetCause::Explicit);
        assert_eq!(p.statistics_summary().angular_error_deg.count(), 0);
        assert!(p.ground_truth().is_imported());
    }

    #[test]
    fn test_statistics_reported_before_stream_restart() {
        let mut config = config128();
        config.statistics.measure_accuracy = true;
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let grid = |v: f64| vec![vec![v; 128]; 128];
        p.import_ground_truth(GroundTruthTable::from_grids(grid(10.0), grid(0.0), 0, 1_000_000).unwrap());

        p.reset(ResetCause::Explicit);
        assert!(p.statistics_before_reset().is_none());

        p.process_packet(&[ev(10, 10, 100), ev(20, 20, 200), ev(30, 30, 300), ev(10, 10, 50)]);
        let before = p.statistics_before_reset().unwrap();
        assert_eq!(before.angular_error_deg.count(), 3);
        assert_eq!(p.statistics_summary().angular_error_deg.count(), 0);

        p.process_packet(&[ev(40, 40, 400)]);
        p.rewind();
        assert_eq!(p.statistics_before_reset().unwrap().angular_error_deg.count(), 1);
    }

    #[test]
    fn test_rewind_without_measurement_reports_nothing() {
        let mut p = FrameProcessor::new(config128(), constant_flow(10.0, 0.0));
        p.process_packet(&[ev(10, 10, 100)]);
        assert_eq!(p.rewind(), PipelineEvent::Reset(ResetCause::Rewind));
        assert!(p.statistics_before_reset().is_none());
    }

    #[test]
    fn test_angular_outliers_excluded_from_statistics() {
        let mut config = config128();
        config.statistics.measure_accuracy = true;
        config.statistics.discard_outliers_enabled = true;
        let mut p = FrameProcessor::new(config, constant_flow(0.0, 10.0));
        let grid = |v: f64| vec![vec![v; 128]; 128];
        p.import_ground_truth(GroundTruthTable::from_grids(grid(10.0), grid(0.0), 0, 1_000_000).unwrap());
        let result = p.process_packet(&[ev(10, 10, 100)]);
        assert!(result.events[0].outlier);
        assert_eq!(p.statistics_summary().angular_error_deg.count(), 0);
        assert!(p.field().visible_cells().is_empty());
    }

    #[test]
    fn test_resize_rebuilds_and_resets() {
        let mut p = FrameProcessor::new(config128(), constant_flow(10.0, 0.0));
        p.process_packet(&[ev(10, 10, 100)]);
        let events = p.resize(ChipGeometry::new(64, 32, 18.5));
        assert_eq!(
            events,
            vec![
                PipelineEvent::Resized {
                    width: 64,
                    height: 32,
                    subsample_shift: 0,
                    field_subsample_shift: 3
                },
                PipelineEvent::Reset(ResetCause::GeometryChanged)
            ]
        );
        assert_eq!(p.admission().dimensions(), (64, 32));
        assert_eq!(p.field().dimensions(), (9, 5));

        let events = p.set_field_subsample_shift(7);
        assert!(matches!(
            events[0],
            PipelineEvent::Resized {
                field_subsample_shift: 5,
                ..
            }
        ));
        p.set_subsample_shift(9);
        assert_eq!(p.config().subsample_shift, MAX_SUBSAMPLE_SHIFT);
        assert_eq!(p.admission().dimensions(), (4, 2));
    }

    #[test]
    fn test_zero_size_chip_is_inert() {
        let config = FlowConfig {
            chip: ChipGeometry::new(0, 0, 18.5),
            ..Default::default()
        };
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let result = p.process_packet(&[ev(0, 0, 1), ev(5, 5, 2)]);
        assert_eq!(result.counters.out_of_bounds, 2);
        assert!(result.events.is_empty());
    }

    #[test]
    fn test_sink_sees_every_emitted_event() {
        let mut p = FrameProcessor::new(config128(), constant_flow(10.0, 0.0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        assert!(p.set_sink(Some(Box::new(SharedSink(Arc::clone(&seen))))).is_none());
        let result = p.process_packet(&[ev(10, 10, 100), ev(20, 20, 200)]);
        assert_eq!(*seen.lock(), result.events);
    }

    #[test]
    fn test_processing_time_recorded() {
        let mut config = config128();
        config.statistics.measure_processing_time = true;
        config.statistics.measure_global_motion = true;
        let mut p = FrameProcessor::new(config, constant_flow(10.0, 0.0));
        let result = p.process_packet(&[ev(10, 10, 100), ev(20, 20, 200)]);
        let gm = result.global_motion.unwrap();
        assert_relative_eq!(gm.vx, 10.0);
        let summary = p.statistics_summary();
        assert_eq!(summary.packet_time_us.count(), 1);
        assert_eq!(summary.event_time_us.count(), 1);
        assert_eq!(p.packets_processed(), 1);
    }
}
