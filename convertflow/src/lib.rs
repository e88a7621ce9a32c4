//! # Convertflow
//!
//! LLM-driven source conversion with continuation stitching and a bounded
//! refinement loop.
//!
//! Convertflow provides:
//!
//! - **Inference client**: reconstructs one document from output the model
//!   service truncates at its token budget
//! - **Stages**: analysis, conversion, validation, security assessment,
//!   feedback and integration behind one trait
//! - **Orchestration**: a validate/assess/improve loop with best-effort stages
//!   and running statistics
//! - **Batch fan-out**: many inputs under a concurrency cap with per-item
//!   failure isolation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use convertflow::prelude::*;
//!
//! let config = AppConfig::from_env();
//! let orchestrator = Arc::new(PipelineOrchestrator::from_config(&config)?);
//!
//! let report = BatchCoordinator::new(orchestrator)
//!     .process_all(inputs, config.batch.concurrency_limit)
//!     .await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::cast_precision_loss
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod inference;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{AppConfig, BatchConfig, InferenceConfig, PipelineConfig};
    pub use crate::context::{ConversionContext, FeedbackEntry, SourceKind, SourceMetadata};
    pub use crate::errors::{ConvertError, InferenceError, NonCriticalStageError, PreconditionError};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::inference::{InferenceClient, ModelTransport, StitchPolicy, StopReason};
    pub use crate::observability::init_tracing;
    pub use crate::pipeline::{
        BatchCoordinator, BatchReport, ConversionOutcome, ItemPipeline, PipelineOrchestrator,
        SourceInput,
    };
    pub use crate::stages::{Stage, StageKind, StageResult, StageSet};
    pub use std::sync::Arc;
}
