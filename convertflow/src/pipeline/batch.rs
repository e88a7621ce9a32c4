//! Concurrency-bounded fan-out of the single-item pipeline.

use super::orchestrator::{ConversionOutcome, PipelineOrchestrator, SourceInput};
use crate::errors::{ConvertError, Result};
use crate::events::{EventSink, NoOpEventSink, BATCH_COMPLETED, BATCH_ITEM_COMPLETED};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// The unit of work a batch fans out.
#[async_trait]
pub trait ItemPipeline: Send + Sync {
    /// Processes one input.
    async fn process(&self, input: SourceInput) -> Result<ConversionOutcome>;
}

#[async_trait]
impl ItemPipeline for PipelineOrchestrator {
    async fn process(&self, input: SourceInput) -> Result<ConversionOutcome> {
        Ok(self.convert_input(input).await)
    }
}

/// Result for one batch input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Identifier of the input.
    pub identifier: String,
    /// Whether the item converted successfully.
    pub success: bool,
    /// Processing time in milliseconds, excluding time spent queued.
    pub duration_ms: f64,
    /// Why the item failed.
    pub error: Option<String>,
    /// Full outcome, when the pipeline produced one.
    pub outcome: Option<ConversionOutcome>,
}

/// Aggregate result of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Number of inputs.
    pub total: usize,
    /// Items that succeeded.
    pub succeeded: usize,
    /// Items that failed.
    pub failed: usize,
    /// Wall-clock time for the whole batch in milliseconds.
    pub total_duration_ms: f64,
    /// Per-item results in input order.
    pub items: Vec<BatchItemResult>,
}

/// Runs many inputs through one pipeline with at most `concurrency_limit`
/// runs in flight.
///
/// A failing or panicking item becomes a failed [`BatchItemResult`]; it never
/// cancels its siblings. Failed items are not retried.
#[derive(Debug)]
pub struct BatchCoordinator<P: ItemPipeline + 'static> {
    pipeline: Arc<P>,
    events: Arc<dyn EventSink>,
}

impl<P: ItemPipeline + 'static> BatchCoordinator<P> {
    /// Creates a coordinator over a shared pipeline.
    #[must_use]
    pub fn new(pipeline: Arc<P>) -> Self {
        Self {
            pipeline,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Processes every input and returns results in input order.
    ///
    /// A limit of zero is treated as one.
    pub async fn process_all(&self, inputs: Vec<SourceInput>, concurrency_limit: usize) -> BatchReport {
        let limit = concurrency_limit.max(1);
        let total = inputs.len();
        let started = Instant::now();
        info!(total, concurrency_limit = limit, "Starting batch");

        let semaphore = Arc::new(Semaphore::new(limit));
        let tasks = inputs.into_iter().map(|input| {
            let identifier = input.identifier.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let handle = tokio::spawn(async move {
                let permit = semaphore.acquire_owned().await;
                let item_started = Instant::now();
                let result = match permit {
                    Ok(_permit) => pipeline.process(input).await,
                    Err(err) => Err(ConvertError::Internal(err.to_string())),
                };
                (result, item_started.elapsed().as_secs_f64() * 1000.0)
            });
            async move { (identifier, handle.await) }
        });

        let items: Vec<BatchItemResult> = join_all(tasks)
            .await
            .into_iter()
            .map(|(identifier, joined)| {
                let item = match joined {
                    Ok((Ok(outcome), duration_ms)) => BatchItemResult {
                        identifier,
                        success: outcome.success,
                        duration_ms,
                        error: outcome.error.clone(),
                        outcome: Some(outcome),
                    },
                    Ok((Err(err), duration_ms)) => BatchItemResult {
                        identifier,
                        success: false,
                        duration_ms,
                        error: Some(err.to_string()),
                        outcome: None,
                    },
                    Err(join_err) => BatchItemResult {
                        identifier,
                        success: false,
                        duration_ms: 0.0,
                        error: Some(format!("item task failed: {join_err}")),
                        outcome: None,
                    },
                };
                self.item_completed(&item);
                item
            })
            .collect();

        let succeeded = items.iter().filter(|item| item.success).count();
        let report = BatchReport {
            total,
            succeeded,
            failed: total - succeeded,
            total_duration_ms: started.elapsed().as_secs_f64() * 1000.0,
            items,
        };

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            duration_ms = report.total_duration_ms,
            "Batch finished"
        );
        self.events.emit(
            BATCH_COMPLETED,
            serde_json::json!({
                "total": report.total,
                "succeeded": report.succeeded,
                "failed": report.failed,
                "total_duration_ms": report.total_duration_ms,
            }),
        );
        report
    }

    fn item_completed(&self, item: &BatchItemResult) {
        if let Some(ref err) = item.error {
            error!(identifier = %item.identifier, error = %err, "Batch item failed");
        }
        self.events.emit(
            BATCH_ITEM_COMPLETED,
            serde_json::json!({
                "identifier": item.identifier,
                "success": item.success,
                "duration_ms": item.duration_ms,
                "error": item.error,
            }),
        );
    }
}
