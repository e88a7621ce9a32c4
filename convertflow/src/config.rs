//! Configuration types for inference, the refinement pipeline and batches.
//!
//! Every struct deserializes with defaults for missing fields, so a config
//! file only needs to name what it changes. Environment variables are applied
//! on top by [`AppConfig::apply_env`].

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the model service and the inference worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Model identifier sent with every request.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Service region, used to derive the default endpoint.
    #[serde(default = "default_region")]
    pub region: String,
    /// Explicit endpoint base URL. Overrides the region-derived one.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bearer token for the service.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Maximum output tokens per round trip.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Nucleus sampling top-p.
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    /// Read timeout of the transport in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: f64,
    /// Number of blocking inference calls allowed in flight at once.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,
    /// Upper bound on continuation round trips for one logical request.
    #[serde(default = "default_max_continuations")]
    pub max_continuations: usize,
    /// Text of the synthetic user turn that asks the model to continue.
    #[serde(default = "default_continue_prompt")]
    pub continue_prompt: String,
}

fn default_model_id() -> String {
    "us.amazon.nova-premier-v1:0".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f32 {
    0.05
}

fn default_top_p() -> f32 {
    0.9
}

fn default_read_timeout() -> f64 {
    300.0
}

fn default_worker_pool_size() -> usize {
    8
}

fn default_max_continuations() -> usize {
    32
}

fn default_continue_prompt() -> String {
    "Continue generation from where you left off.".to_string()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            region: default_region(),
            endpoint: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            read_timeout_seconds: default_read_timeout(),
            worker_pool_size: default_worker_pool_size(),
            max_continuations: default_max_continuations(),
            continue_prompt: default_continue_prompt(),
        }
    }
}

impl InferenceConfig {
    /// Creates a new inference configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the model identifier.
    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Sets an explicit endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the worker pool size.
    #[must_use]
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size;
        self
    }

    /// Sets the continuation cap.
    #[must_use]
    pub fn with_max_continuations(mut self, max: usize) -> Self {
        self.max_continuations = max;
        self
    }

    /// Endpoint base URL, derived from the region when not set explicitly.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!("https://bedrock-runtime.{}.amazonaws.com", self.region)
        })
    }

    /// Gets the read timeout as a Duration.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.read_timeout_seconds)
    }
}

/// Configuration for a single-item pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum refinement iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Pause between refinement iterations in milliseconds.
    #[serde(default = "default_iteration_delay_ms")]
    pub iteration_delay_ms: u64,
    /// Whether to run the integration stage once a conversion is complete.
    #[serde(default = "default_run_integration")]
    pub run_integration: bool,
}

fn default_max_iterations() -> usize {
    5
}

fn default_iteration_delay_ms() -> u64 {
    1000
}

fn default_run_integration() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            iteration_delay_ms: default_iteration_delay_ms(),
            run_integration: default_run_integration(),
        }
    }
}

impl PipelineConfig {
    /// Creates a new pipeline configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum refinement iterations.
    #[must_use]
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Sets the delay between iterations.
    #[must_use]
    pub fn with_iteration_delay_ms(mut self, delay: u64) -> Self {
        self.iteration_delay_ms = delay;
        self
    }

    /// Enables or disables the integration stage.
    #[must_use]
    pub fn with_integration(mut self, enabled: bool) -> Self {
        self.run_integration = enabled;
        self
    }

    /// Gets the iteration delay as a Duration.
    #[must_use]
    pub fn iteration_delay(&self) -> Duration {
        Duration::from_millis(self.iteration_delay_ms)
    }
}

/// Configuration for batch fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum pipeline runs in flight at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

fn default_concurrency_limit() -> usize {
    3
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

impl BatchConfig {
    /// Sets the concurrency limit.
    #[must_use]
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model service settings.
    #[serde(default)]
    pub inference: InferenceConfig,
    /// Pipeline settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Batch settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

impl AppConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(text: &str) -> crate::errors::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a configuration file and applies environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Builds a configuration from defaults and the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Applies `CONVERTFLOW_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CONVERTFLOW_MODEL_ID") {
            self.inference.model_id = v;
        }
        if let Some(v) = lookup("CONVERTFLOW_REGION") {
            self.inference.region = v;
        }
        if let Some(v) = lookup("CONVERTFLOW_ENDPOINT") {
            self.inference.endpoint = Some(v);
        }
        if let Some(v) = lookup("CONVERTFLOW_API_KEY") {
            self.inference.api_key = Some(v);
        }
        if let Some(v) = lookup("CONVERTFLOW_MAX_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.pipeline.max_iterations = v;
        }
        if let Some(v) = lookup("CONVERTFLOW_CONCURRENCY").and_then(|v| v.parse().ok()) {
            self.batch.concurrency_limit = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.inference.max_tokens, 4096);
        assert!((config.inference.temperature - 0.05).abs() < f32::EPSILON);
        assert!((config.inference.top_p - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.inference.read_timeout(), Duration::from_secs(300));
        assert_eq!(config.pipeline.max_iterations, 5);
        assert_eq!(config.batch.concurrency_limit, 3);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json_str(
            r#"{"inference": {"model_id": "test-model"}, "pipeline": {"max_iterations": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.inference.model_id, "test-model");
        assert_eq!(config.inference.max_tokens, 4096);
        assert_eq!(config.pipeline.max_iterations, 2);
        assert!(config.pipeline.run_integration);
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = AppConfig::from_json_str("{\"pipeline\": ").unwrap_err();
        assert_eq!(err.code(), "SERIALIZATION");
    }

    #[test]
    fn test_resolved_endpoint() {
        let config = InferenceConfig::default();
        assert_eq!(
            config.resolved_endpoint(),
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        );

        let config = config.with_endpoint("http://localhost:8080");
        assert_eq!(config.resolved_endpoint(), "http://localhost:8080");
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONVERTFLOW_MODEL_ID", "other-model"),
            ("CONVERTFLOW_MAX_ITERATIONS", "7"),
            ("CONVERTFLOW_CONCURRENCY", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.inference.model_id, "other-model");
        assert_eq!(config.pipeline.max_iterations, 7);
        assert_eq!(config.batch.concurrency_limit, 3);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"batch": {{"concurrency_limit": 6}}}}"#).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert!(config.batch.concurrency_limit >= 1);
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/convertflow.json").unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = InferenceConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
