//! Lifecycle events emitted by the orchestrator and batch coordinator.
//!
//! Events are fire-and-forget: a sink never fails the run that emits to it.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A conversion run started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A refinement iteration finished.
pub const PIPELINE_ITERATION: &str = "pipeline.iteration";
/// A conversion run finished successfully.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A conversion run aborted on a fatal stage failure.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A best-effort stage failed and the run continued.
pub const STAGE_DEGRADED: &str = "stage.degraded";
/// One batch item finished, successfully or not.
pub const BATCH_ITEM_COMPLETED: &str = "batch.item_completed";
/// A whole batch finished.
pub const BATCH_COMPLETED: &str = "batch.completed";
