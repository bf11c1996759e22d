//! The per-packet flow pipeline.
//!
//! `FrameProcessor` composes the engines; the upstream flow computation is
//! plugged in through the [`FlowAlgorithm`] trait.

pub mod algorithm;
pub mod processor;
pub mod result;

pub use algorithm::{FlowAlgorithm, FlowContext, ImuFlowAlgorithm};
pub use processor::FrameProcessor;
pub use result::{PacketCounters, PacketResult};
