//! Structured logging setup and span helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs the global subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json` set,
/// events are written as one JSON object per line.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    }
}

/// Attributes attached to the span of one conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSpanAttributes {
    /// Run identifier.
    pub run_id: String,
    /// Input identifier, usually a filename.
    pub identifier: Option<String>,
    /// Which pipeline path ran.
    pub mode: Option<String>,
}

impl RunSpanAttributes {
    /// Creates attributes for a run.
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Sets the input identifier.
    #[must_use]
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Sets the pipeline path.
    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Flattens to dotted attribute names.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("conversion.run_id".to_string(), self.run_id.clone());
        if let Some(ref v) = self.identifier {
            attrs.insert("conversion.identifier".to_string(), v.clone());
        }
        if let Some(ref v) = self.mode {
            attrs.insert("conversion.mode".to_string(), v.clone());
        }
        attrs
    }

    /// Opens an info span carrying these attributes.
    #[must_use]
    pub fn span(&self) -> ::tracing::Span {
        ::tracing::info_span!(
            "conversion",
            run_id = %self.run_id,
            identifier = self.identifier.as_deref().unwrap_or(""),
            mode = self.mode.as_deref().unwrap_or("")
        )
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
