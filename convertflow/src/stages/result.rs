//! Stage kinds and the tagged result every stage returns.

use super::payload::{AnalysisReport, SecurityReport, ValidationReport};
use crate::context::ConversionContext;
use crate::errors::ConvertError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Structural analysis of the source.
    Analyze,
    /// Initial transform of the source into the artifact.
    Convert,
    /// Completeness check of the artifact.
    Validate,
    /// Security review of source and artifact.
    SecurityAssess,
    /// Improves the artifact from validation and security findings.
    Feedback,
    /// Merges the artifact with related converted files.
    Integrate,
    /// Single-pass conversion of data-access code.
    DomainSpecificConvert,
}

impl StageKind {
    /// All kinds in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::Analyze,
        Self::Convert,
        Self::Validate,
        Self::SecurityAssess,
        Self::Feedback,
        Self::Integrate,
        Self::DomainSpecificConvert,
    ];

    /// Stage name used in traces, logs and results.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Analyze => "code_analysis",
            Self::Convert => "conversion",
            Self::Validate => "validation",
            Self::SecurityAssess => "security_assessment",
            Self::Feedback => "feedback",
            Self::Integrate => "integration",
            Self::DomainSpecificConvert => "domain_conversion",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed payload produced by a successful stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StagePayload {
    /// Analysis report.
    Analysis(AnalysisReport),
    /// Produced or replaced artifact.
    Artifact {
        /// Artifact text.
        text: String,
    },
    /// Validation report.
    Validation(ValidationReport),
    /// Security report.
    Security(SecurityReport),
    /// Feedback iteration applied.
    Feedback {
        /// 1-based iteration number.
        iteration: usize,
    },
    /// The stage had nothing to do.
    Unchanged,
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Error code from [`ConvertError::code`].
    pub code: String,
    /// Human readable message.
    pub message: String,
}

impl From<&ConvertError> for StageFailure {
    fn from(err: &ConvertError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Completed or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage ran and produced a payload.
    Completed(StagePayload),
    /// The stage could not run or its inference call failed.
    Failed(StageFailure),
}

/// Result of one stage run. The context is always handed back, even on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage that produced the result.
    pub stage: StageKind,
    /// The context, mutated by the stage.
    pub context: ConversionContext,
    /// Completed payload or failure.
    pub outcome: StageOutcome,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    /// Creates a completed result.
    #[must_use]
    pub fn completed(
        stage: StageKind,
        context: ConversionContext,
        payload: StagePayload,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            context,
            outcome: StageOutcome::Completed(payload),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage: StageKind,
        context: ConversionContext,
        error: &ConvertError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage,
            context,
            outcome: StageOutcome::Failed(error.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, StageOutcome::Completed(_))
    }

    /// Returns the payload if the stage succeeded.
    #[must_use]
    pub fn payload(&self) -> Option<&StagePayload> {
        match &self.outcome {
            StageOutcome::Completed(payload) => Some(payload),
            StageOutcome::Failed(_) => None,
        }
    }

    /// Returns the failure if the stage failed.
    #[must_use]
    pub fn failure(&self) -> Option<&StageFailure> {
        match &self.outcome {
            StageOutcome::Completed(_) => None,
            StageOutcome::Failed(failure) => Some(failure),
        }
    }

    /// Returns the error message if the stage failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.failure().map(|f| f.message.as_str())
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Validation completeness, if this is a validation result.
    #[must_use]
    pub fn is_complete(&self) -> Option<bool> {
        match self.payload() {
            Some(StagePayload::Validation(report)) => Some(report.is_complete),
            _ => None,
        }
    }

    /// Critical vulnerability count, if this is a security result.
    #[must_use]
    pub fn critical_vulnerability_count(&self) -> Option<usize> {
        match self.payload() {
            Some(StagePayload::Security(report)) => Some(report.critical_count()),
            _ => None,
        }
    }

    /// Splits the result into its context and outcome.
    #[must_use]
    pub fn into_parts(self) -> (ConversionContext, StageOutcome) {
        (self.context, self.outcome)
    }
}
