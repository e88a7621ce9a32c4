//! Request and response types exchanged with the model service.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller.
    User,
    /// The model.
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced the turn.
    pub role: Role,
    /// Text content.
    pub text: String,
}

impl Turn {
    /// Creates a user turn.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Creates an assistant turn.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Sampling parameters for a generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Maximum output tokens for one round trip.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling top-p.
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.05,
            top_p: 0.9,
        }
    }
}

/// A single request to the model service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Model identifier.
    pub model_id: String,
    /// System instruction.
    pub system: String,
    /// Ordered conversation history.
    pub turns: Vec<Turn>,
    /// Sampling parameters.
    pub params: GenerationParams,
}

/// Why the model stopped producing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished on its own.
    Complete,
    /// Output was cut off at the token budget.
    LengthTruncated,
}

impl StopReason {
    /// Maps a wire-level stop reason to a [`StopReason`].
    ///
    /// Only `max_tokens` means truncation; every other reason ends generation.
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        if reason == "max_tokens" {
            Self::LengthTruncated
        } else {
            Self::Complete
        }
    }

    /// Returns true if the output was truncated.
    #[must_use]
    pub fn is_truncated(self) -> bool {
        matches!(self, Self::LengthTruncated)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::LengthTruncated => write!(f, "length_truncated"),
        }
    }
}

/// Response to one round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResponse {
    /// Generated text.
    pub text: String,
    /// Normalized stop reason.
    pub stop_reason: StopReason,
    /// Stop reason as reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stop_reason: Option<String>,
    /// Input tokens reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Output tokens reported by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Round-trip latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl InferenceResponse {
    /// Creates a response with only text and stop reason.
    #[must_use]
    pub fn new(text: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            text: text.into(),
            stop_reason,
            raw_stop_reason: None,
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }

    /// Converts usage figures to log/span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("llm.stop_reason".to_string(), serde_json::json!(self.stop_reason.to_string()));
        if let Some(t) = self.input_tokens { map.insert("llm.input_tokens".to_string(), serde_json::json!(t)); }
        if let Some(t) = self.output_tokens { map.insert("llm.output_tokens".to_string(), serde_json::json!(t)); }
        map.insert("llm.total_tokens".to_string(), serde_json::json!(self.total_tokens()));
        if let Some(l) = self.latency_ms { map.insert("llm.latency_ms".to_string(), serde_json::json!(l)); }
        map
    }
}

/// Result of a logical generation, possibly spanning several round trips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    /// Raw fragments in the order they were received.
    pub fragments: Vec<String>,
    /// Stop reason of the last round trip.
    pub final_stop: StopReason,
}

impl Generation {
    /// Number of round trips performed.
    #[must_use]
    pub fn round_trips(&self) -> usize {
        self.fragments.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_from_wire() {
        assert_eq!(StopReason::from_wire("max_tokens"), StopReason::LengthTruncated);
        assert_eq!(StopReason::from_wire("end_turn"), StopReason::Complete);
        assert_eq!(StopReason::from_wire("stop_sequence"), StopReason::Complete);
        assert_eq!(StopReason::from_wire("content_filtered"), StopReason::Complete);
        assert!(StopReason::LengthTruncated.is_truncated());
    }

    #[test]
    fn test_turn_constructors() {
        assert_eq!(Turn::user("hi").role, Role::User);
        assert_eq!(Turn::assistant("hello").role, Role::Assistant);
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_response_attributes() {
        let mut response = InferenceResponse::new("text", StopReason::Complete);
        response.input_tokens = Some(10);
        response.output_tokens = Some(5);

        assert_eq!(response.total_tokens(), 15);
        let attrs = response.to_attributes();
        assert_eq!(attrs.get("llm.total_tokens"), Some(&serde_json::json!(15)));
        assert_eq!(attrs.get("llm.stop_reason"), Some(&serde_json::json!("complete")));
    }
}
