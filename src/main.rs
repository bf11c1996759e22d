use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ev_motion_flow::config::FlowConfig;
use ev_motion_flow::event::chunk_packets;
use ev_motion_flow::io::{DEFAULT_LOG_CAPACITY, MotionVectorLogger, load_ground_truth_dir, load_recording};
use ev_motion_flow::pipeline::{FrameProcessor, ImuFlowAlgorithm, PacketCounters};
use ev_motion_flow::system::{PipelineEvent, SharedPipeline};

/// Items per packet handed to the pipeline.
const PACKET_SIZE: usize = 4096;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let stream_path = args
        .next()
        .context("usage: ev-motion-flow <stream.csv> [config.yaml] [ground_truth_dir] [motion_log.txt]")?;
    let config_path = args.next();
    let ground_truth_dir = args.next();
    let motion_log_path = args.next();

    let config = match &config_path {
        Some(path) => FlowConfig::from_yaml_file(path)?,
        None => FlowConfig::default(),
    };

    println!("Loading event stream from: {}", stream_path);
    let recording = load_recording(&stream_path)?;
    println!(
        "Loaded {} events and {} IMU samples",
        recording.num_events, recording.num_imu_samples
    );
    if let Some((first, last)) = recording.time_span_us() {
        println!(
            "Stream covers {} us to {} us ({:.3} s)",
            first,
            last,
            (last - first) as f64 * 1e-6
        );
    }

    let mut processor = FrameProcessor::new(config, Box::new(ImuFlowAlgorithm));
    if let Some(dir) = &ground_truth_dir {
        let table = load_ground_truth_dir(dir)
            .with_context(|| format!("Failed to import ground truth from {}", dir))?;
        processor.import_ground_truth(table);
    }
    if let Some(path) = &motion_log_path {
        let logger = MotionVectorLogger::create(path, DEFAULT_LOG_CAPACITY)?;
        processor.set_sink(Some(Box::new(logger)));
    }

    let pipeline = SharedPipeline::new(processor);
    let notifications = pipeline.subscribe();
    let mut totals = PacketCounters::default();

    for (i, packet) in chunk_packets(&recording.items, PACKET_SIZE).enumerate() {
        let result = pipeline.process_packet(packet);
        totals.accumulate(&result.counters);

        for event in notifications.try_iter() {
            match event {
                PipelineEvent::Reset(cause) => println!("Packet {}: pipeline reset ({:?})", i, cause),
                PipelineEvent::Recalibrated(offsets) => println!(
                    "Packet {}: IMU offsets (pan, tilt, roll) = ({:.4}, {:.4}, {:.4}) deg/s",
                    i, offsets.pan, offsets.tilt, offsets.roll
                ),
                PipelineEvent::Resized { width, height, .. } => {
                    println!("Packet {}: resized to {}x{}", i, width, height)
                }
            }
        }

        if i % 100 == 0 {
            println!(
                "Packet {}: {} motion events, {} visible field cells",
                i,
                result.events.len(),
                pipeline.field_snapshot().visible_cells().len()
            );
        }
    }

    // Flush the motion log before reporting.
    pipeline.reconfigure(|p| {
        p.set_sink(None);
        Vec::new()
    });

    println!("Totals: {}", totals);
    let summary = pipeline.statistics();
    if !summary.calibration_set {
        warn!("IMU offsets are not set; accuracy against IMU ground truth is unreliable");
    }
    println!("{}", summary);
    Ok(())
}
