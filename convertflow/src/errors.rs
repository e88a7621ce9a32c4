//! Error types for the convertflow pipeline.
//!
//! Inference and precondition failures abort a run; best-effort stage
//! failures are wrapped in [`NonCriticalStageError`] and only logged.
//! Malformed structured payloads are not errors at all, see
//! [`crate::stages::payload`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for convertflow operations.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The model service could not be reached or rejected the request.
    #[error("{0}")]
    Inference(#[from] InferenceError),

    /// A stage ran before the data it needs was on the context.
    #[error("{0}")]
    Precondition(#[from] PreconditionError),

    /// A best-effort stage failed.
    #[error("{0}")]
    NonCriticalStage(#[from] NonCriticalStageError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ConvertError {
    /// Returns a stable machine-readable code for the error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Inference(_) => "INFERENCE",
            Self::Precondition(_) => "PRECONDITION",
            Self::NonCriticalStage(_) => "NON_CRITICAL_STAGE",
            Self::Internal(_) => "INTERNAL",
            Self::Serialization(_) => "SERIALIZATION",
        }
    }

    /// Returns true if the error must abort the current run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::NonCriticalStage(_))
    }
}

/// Failure talking to the model service.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// The request never produced a response (connect, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("Service error ({status}): {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Body or reason returned by the service.
        message: String,
    },

    /// The service answered but the body did not have the expected shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The blocking worker running the call panicked or was dropped.
    #[error("Inference worker failed: {0}")]
    Worker(String),
}

impl InferenceError {
    /// Returns true if the error came from the read timeout of the transport.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(msg) if msg.contains("timed out"))
    }
}

/// Error raised when a stage's required upstream data is missing.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' precondition failed: {missing} is not available")]
pub struct PreconditionError {
    /// The stage that could not run.
    pub stage: String,
    /// Description of the missing input.
    pub missing: String,
}

impl PreconditionError {
    /// Creates a new precondition error.
    #[must_use]
    pub fn new(stage: impl Into<String>, missing: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            missing: missing.into(),
        }
    }
}

/// Failure of a stage the pipeline treats as best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Non-critical stage '{stage}' failed: {message}")]
pub struct NonCriticalStageError {
    /// Stage that failed.
    pub stage: String,
    /// Original error message.
    pub message: String,
}

impl NonCriticalStageError {
    /// Creates a new non-critical stage error.
    #[must_use]
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Converts to a dictionary representation for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("stage".to_string(), serde_json::json!(self.stage));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map
    }
}

/// Convenience result alias.
pub type Result<T, E = ConvertError> = std::result::Result<T, E>;
