//! Structured payloads embedded in free-text model answers.
//!
//! A payload is the JSON object between the first `{` and the last `}` of an
//! answer. When it is missing or malformed the report type supplies a
//! deterministic fallback with `parse_failed` set and the raw answer kept, so
//! a bad answer never fails the stage that asked for it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Locates the delimiter-bounded payload by first `{` / last `}`.
#[must_use]
pub fn locate_payload(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// A report that can be parsed from a model answer or synthesized on failure.
pub trait StructuredPayload: DeserializeOwned + Sized {
    /// Report used when the answer holds no parseable payload.
    fn fallback(raw: &str) -> Self;

    /// Returns true if this is a fallback report.
    fn parse_failed(&self) -> bool;

    /// Parses the payload out of `text`, falling back on any failure.
    fn extract(text: &str) -> Self {
        let parsed = locate_payload(text)
            .ok_or_else(|| "no delimited payload found".to_string())
            .and_then(|block| serde_json::from_str::<Self>(block).map_err(|e| e.to_string()));

        match parsed {
            Ok(report) => report,
            Err(reason) => {
                warn!(%reason, payload = std::any::type_name::<Self>(), "Failed to parse structured payload");
                Self::fallback(text)
            }
        }
    }
}

/// Reads a list section leniently: `null` and `""` become an empty list and
/// any other non-array value becomes a one-element list.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<serde_json::Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::Array(items) => items,
        serde_json::Value::String(text) if text.trim().is_empty() => Vec::new(),
        other => vec![other],
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Output of the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Overall complexity as judged by the model.
    #[serde(default = "default_complexity", deserialize_with = "complexity_or_default")]
    pub complexity: String,
    /// Main functions found in the source.
    #[serde(default, deserialize_with = "lenient_list")]
    pub main_functions: Vec<serde_json::Value>,
    /// Dependencies found in the source.
    #[serde(default, deserialize_with = "lenient_list")]
    pub dependencies: Vec<serde_json::Value>,
    /// Anticipated conversion challenges.
    #[serde(default, deserialize_with = "lenient_list")]
    pub conversion_challenges: Vec<serde_json::Value>,
    /// Any further sections the model returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Set on fallback reports.
    #[serde(default)]
    pub parse_failed: bool,
    /// Raw answer, kept on fallback reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

fn default_complexity() -> String {
    "unknown".to_string()
}

fn complexity_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => text,
        serde_json::Value::Null => default_complexity(),
        other => other.to_string(),
    })
}

impl StructuredPayload for AnalysisReport {
    fn fallback(raw: &str) -> Self {
        Self {
            complexity: "medium".to_string(),
            main_functions: Vec::new(),
            dependencies: Vec::new(),
            conversion_challenges: vec![serde_json::json!("JSON parsing failed")],
            extra: serde_json::Map::new(),
            parse_failed: true,
            raw_response: Some(raw.to_string()),
        }
    }

    fn parse_failed(&self) -> bool {
        self.parse_failed
    }
}

/// Output of the validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether the artifact implements everything in the source.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_complete: bool,
    /// Score between 0 and 1.
    #[serde(default, deserialize_with = "null_as_default")]
    pub completeness_score: f64,
    /// Problems found.
    #[serde(default, deserialize_with = "lenient_list")]
    pub issues: Vec<serde_json::Value>,
    /// Suggested fixes.
    #[serde(default, deserialize_with = "lenient_list")]
    pub suggestions: Vec<serde_json::Value>,
    /// Any further sections the model returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Set on fallback reports.
    #[serde(default)]
    pub parse_failed: bool,
    /// Raw answer, kept on fallback reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl StructuredPayload for ValidationReport {
    fn fallback(raw: &str) -> Self {
        Self {
            is_complete: false,
            completeness_score: 0.5,
            issues: vec![serde_json::json!("JSON parsing failed")],
            suggestions: vec![serde_json::json!("Review validation response format")],
            extra: serde_json::Map::new(),
            parse_failed: true,
            raw_response: Some(raw.to_string()),
        }
    }

    fn parse_failed(&self) -> bool {
        self.parse_failed
    }
}

/// Output of the security assessment stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    /// Highest-severity findings; their count gates loop completion.
    #[serde(default, deserialize_with = "lenient_list")]
    pub critical_vulnerabilities: Vec<serde_json::Value>,
    /// Lower-severity findings.
    #[serde(default, deserialize_with = "lenient_list")]
    pub security_risk_issues: Vec<serde_json::Value>,
    /// Recommendations for the converted code.
    #[serde(default, deserialize_with = "lenient_list")]
    pub secure_code_recommendations: Vec<serde_json::Value>,
    /// Compliance gaps.
    #[serde(default, deserialize_with = "lenient_list")]
    pub compliance_gaps: Vec<serde_json::Value>,
    /// Notes specific to the migration.
    #[serde(default, deserialize_with = "lenient_list")]
    pub migration_security_notes: Vec<serde_json::Value>,
    /// Any further sections the model returned.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Set on fallback reports.
    #[serde(default)]
    pub parse_failed: bool,
    /// Raw answer, kept on fallback reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl SecurityReport {
    /// Number of critical vulnerabilities.
    #[must_use]
    pub fn critical_count(&self) -> usize {
        self.critical_vulnerabilities.len()
    }
}

impl StructuredPayload for SecurityReport {
    fn fallback(raw: &str) -> Self {
        Self {
            critical_vulnerabilities: Vec::new(),
            security_risk_issues: Vec::new(),
            secure_code_recommendations: vec![serde_json::json!(
                "JSON parsing failed - manual security review required"
            )],
            compliance_gaps: vec![serde_json::json!("Assessment parsing failed")],
            migration_security_notes: vec![serde_json::json!("Manual security review required")],
            extra: serde_json::Map::new(),
            parse_failed: true,
            raw_response: Some(raw.to_string()),
        }
    }

    fn parse_failed(&self) -> bool {
        self.parse_failed
    }
}
