//! Pipeline orchestration and batch execution.
//!
//! This module provides:
//! - The single-item orchestrator with its refinement loop
//! - Running statistics across runs
//! - Concurrency-bounded batch fan-out

mod batch;
mod orchestrator;
mod stats;

pub use batch::{BatchCoordinator, BatchItemResult, BatchReport, ItemPipeline};
pub use orchestrator::{ConversionOutcome, PipelineOrchestrator, SourceInput};
pub use stats::{RunningStats, StatsSnapshot};
