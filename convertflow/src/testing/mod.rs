//! Testing utilities for conversion pipelines.
//!
//! This module provides:
//! - A scripted model transport that replays canned responses
//! - Scripted and failing stages for orchestrator tests
//! - Report fixtures

mod fixtures;
mod mocks;
mod transport;

pub use fixtures::{scripted_stage_set, security_report, validation_report};
pub use mocks::{FailingStage, ScriptedStage, Step};
pub use transport::ScriptedTransport;
