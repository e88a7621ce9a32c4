//! The unit of work threaded through one pipeline run.

use super::metadata::SourceMetadata;
use crate::stages::payload::{AnalysisReport, SecurityReport, ValidationReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One refinement iteration applied by the feedback stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    /// 1-based iteration number.
    pub iteration: usize,
    /// Issues the feedback stage was asked to address.
    pub issues_addressed: Vec<serde_json::Value>,
    /// Artifact produced by this iteration.
    pub artifact: String,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// State of a single conversion run.
///
/// Stages take the context by value, mutate it and hand it back inside their
/// result; a context is never shared between runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionContext {
    /// Source text being converted.
    pub source: String,
    /// Produced artifact, once a transform stage has run.
    pub artifact: Option<String>,
    /// Structured analysis of the source.
    pub analysis: Option<AnalysisReport>,
    /// Latest validation results.
    pub validation: Option<ValidationReport>,
    /// Latest security assessment.
    pub security: Option<SecurityReport>,
    /// Feedback iterations applied so far.
    feedback_history: Vec<FeedbackEntry>,
    /// Run identifier.
    pub run_id: String,
    /// Metadata derived from the input, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SourceMetadata>,
    /// Previously converted sibling artifacts for the integration stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_files: Vec<String>,
    /// Append-only "{stage}: {event}" log.
    trace: Vec<String>,
}

impl ConversionContext {
    /// Creates a context for the given source text.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            artifact: None,
            analysis: None,
            validation: None,
            security: None,
            feedback_history: Vec::new(),
            run_id: String::new(),
            metadata: None,
            related_files: Vec::new(),
            trace: Vec::new(),
        }
    }

    /// Attaches source metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Attaches related converted files.
    #[must_use]
    pub fn with_related_files(mut self, files: Vec<String>) -> Self {
        self.related_files = files;
        self
    }

    /// Assigns a fresh run identifier with the given prefix.
    pub fn assign_run_id(&mut self, prefix: &str) -> &str {
        self.run_id = format!("{prefix}_{}", Uuid::new_v4());
        &self.run_id
    }

    /// Appends a trace entry.
    pub fn add_trace(&mut self, stage: &str, event: impl AsRef<str>) {
        self.trace.push(format!("{stage}: {}", event.as_ref()));
    }

    /// Returns the execution trace.
    #[must_use]
    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    /// Returns the feedback history.
    #[must_use]
    pub fn feedback_history(&self) -> &[FeedbackEntry] {
        &self.feedback_history
    }

    /// Records a feedback iteration and makes its artifact current.
    ///
    /// Returns the iteration number assigned to the entry.
    pub fn record_feedback(
        &mut self,
        issues_addressed: Vec<serde_json::Value>,
        artifact: String,
    ) -> usize {
        let iteration = self.feedback_history.len() + 1;
        self.artifact = Some(artifact.clone());
        self.feedback_history.push(FeedbackEntry {
            iteration,
            issues_addressed,
            artifact,
            recorded_at: Utc::now(),
        });
        iteration
    }

    /// Number of critical vulnerabilities in the latest security assessment.
    #[must_use]
    pub fn critical_vulnerability_count(&self) -> Option<usize> {
        self.security.as_ref().map(SecurityReport::critical_count)
    }

    /// Completeness score of the latest validation, or 0.0.
    #[must_use]
    pub fn validation_score(&self) -> f64 {
        self.validation
            .as_ref()
            .map_or(0.0, |v| v.completeness_score)
    }
}
