//! Per-run conversion state.
//!
//! This module provides:
//! - The conversion context owned by exactly one run
//! - Feedback history entries
//! - Source metadata detection used to route inputs

mod conversion;
mod metadata;

pub use conversion::{ConversionContext, FeedbackEntry};
pub use metadata::{Complexity, SourceKind, SourceMetadata};
