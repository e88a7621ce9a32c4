//! Event sink trait and implementations.

use parking_lot::RwLock;
use std::fmt::Debug;
use tracing::{debug, info, Level};

/// Receiver of lifecycle events.
///
/// Implementations must not block and must swallow their own errors.
pub trait EventSink: Send + Sync + Debug {
    /// Emits an event with its JSON payload.
    fn emit(&self, event_type: &str, data: serde_json::Value);
}

/// A no-op event sink that discards all events.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event_type: &str, _data: serde_json::Value) {}
}

/// An event sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink; anything other than DEBUG logs at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event_type: &str, data: serde_json::Value) {
        if self.level == Level::DEBUG {
            debug!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        } else {
            info!(event_type = %event_type, event_data = %data, "Event: {}", event_type);
        }
    }
}

/// A collecting event sink for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, serde_json::Value)>>,
}

impl CollectingEventSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, serde_json::Value)> {
        self.events.read().clone()
    }

    /// Returns the collected event types, in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.read().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns events matching a type prefix.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, serde_json::Value)> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_and_logging_sinks() {
        NoOpEventSink.emit("pipeline.started", serde_json::json!({"run_id": "x"}));
        LoggingEventSink::default().emit("pipeline.started", serde_json::Value::Null);
        LoggingEventSink::debug().emit("pipeline.iteration", serde_json::json!({"iteration": 1}));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("pipeline.started", serde_json::Value::Null);
        sink.emit("pipeline.iteration", serde_json::json!({"iteration": 1}));
        sink.emit("batch.completed", serde_json::json!({"total": 2}));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.events_of_type("pipeline.").len(), 2);
        assert_eq!(sink.events()[1].1["iteration"], 1);
        assert_eq!(sink.event_types()[2], "batch.completed");
    }
}
