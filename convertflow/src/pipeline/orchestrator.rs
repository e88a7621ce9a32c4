//! Single-item conversion pipeline with a bounded refinement loop.
//!
//! A standard run walks `Analyze -> Convert -> RefinementLoop -> Finalize`.
//! Analysis and conversion failures abort the run; inside the loop a
//! validation or feedback failure breaks out to the closing pass, while
//! security assessment and integration only ever degrade the result.

use super::stats::{RunningStats, StatsSnapshot};
use crate::config::PipelineConfig;
use crate::context::{ConversionContext, SourceKind, SourceMetadata};
use crate::errors::NonCriticalStageError;
use crate::events::{
    EventSink, NoOpEventSink, PIPELINE_COMPLETED, PIPELINE_FAILED, PIPELINE_ITERATION,
    PIPELINE_STARTED, STAGE_DEGRADED,
};
use crate::observability::{RunSpanAttributes, SpanTimer};
use crate::stages::{SecurityReport, StageFailure, StageKind, StageOutcome, StagePayload, StageSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

/// One input to convert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInput {
    /// Identifier of the input, usually its path.
    pub identifier: String,
    /// Source text.
    pub source: String,
    /// Previously converted sibling artifacts.
    #[serde(default)]
    pub related_files: Vec<String>,
}

impl SourceInput {
    /// Creates an input without related files.
    #[must_use]
    pub fn new(identifier: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source: source.into(),
            related_files: Vec::new(),
        }
    }

    /// Attaches related converted files.
    #[must_use]
    pub fn with_related_files(mut self, files: Vec<String>) -> Self {
        self.related_files = files;
        self
    }
}

/// Result of one conversion run, handed to the caller with the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutcome {
    /// Whether the run produced a result.
    pub success: bool,
    /// Final artifact, if one was produced.
    pub artifact: Option<String>,
    /// Refinement iterations entered.
    pub iterations_used: usize,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: f64,
    /// Completeness score of the last validation, or 0.0.
    pub validation_score: f64,
    /// Execution trace of the run.
    pub trace: Vec<String>,
    /// Error message of a failed run.
    pub error: Option<String>,
    /// Stage that aborted a failed run.
    pub failed_stage: Option<StageKind>,
    /// True if the loop ran out of iterations without completing.
    pub max_iterations_reached: bool,
    /// Stage whose failure broke the refinement loop early.
    pub loop_interrupted_by: Option<StageKind>,
    /// Failure that broke the refinement loop early.
    pub interruption: Option<StageFailure>,
    /// Best-effort stage failures the run tolerated.
    pub degraded: Vec<NonCriticalStageError>,
    /// Last security assessment, if one succeeded.
    pub security: Option<SecurityReport>,
    /// Critical vulnerabilities in the last security assessment.
    pub critical_vulnerability_count: Option<usize>,
    /// Run identifier.
    pub run_id: String,
    /// Final context of the run.
    pub context: ConversionContext,
}

/// How the refinement loop ended.
#[derive(Debug, Default)]
struct LoopExit {
    iterations_used: usize,
    max_iterations_reached: bool,
    interrupted: Option<(StageKind, StageFailure)>,
}

/// Runs stages for one input at a time and keeps statistics across runs.
///
/// The orchestrator is shared by concurrent runs; each run owns its own
/// context and only the statistics are mutated from several runs.
#[derive(Debug)]
pub struct PipelineOrchestrator {
    stages: StageSet,
    config: PipelineConfig,
    stats: RunningStats,
    events: Arc<dyn EventSink>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the given stages.
    #[must_use]
    pub fn new(stages: StageSet, config: PipelineConfig) -> Self {
        Self {
            stages,
            config,
            stats: RunningStats::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Creates an orchestrator backed by the HTTP model service.
    ///
    /// Builds a blocking HTTP client, so call it outside the async runtime.
    #[cfg(feature = "http")]
    pub fn from_config(config: &crate::config::AppConfig) -> crate::errors::Result<Self> {
        let client = Arc::new(crate::inference::InferenceClient::from_config(&config.inference)?);
        let stages = StageSet::inference_backed(client, Arc::new(crate::stages::DefaultPrompts));
        Ok(Self::new(stages, config.pipeline.clone()))
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the statistics across all runs so far.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Converts a source text through the standard pipeline.
    pub async fn convert(&self, source: impl Into<String>) -> ConversionOutcome {
        self.run(ConversionContext::new(source)).await
    }

    /// Routes an input by its metadata: data-access code takes the
    /// domain-specific path, everything else the standard pipeline.
    pub async fn convert_input(&self, input: SourceInput) -> ConversionOutcome {
        let metadata = SourceMetadata::detect(&input.identifier, &input.source);
        let kind = metadata.kind;
        info!(
            identifier = %input.identifier,
            kind = ?kind,
            complexity = ?metadata.complexity,
            lines = metadata.line_count,
            "Routing input"
        );

        let ctx = ConversionContext::new(input.source)
            .with_metadata(metadata)
            .with_related_files(input.related_files);

        match kind {
            SourceKind::DataAccess => self.run_domain_specific(ctx).await,
            SourceKind::General => self.run(ctx).await,
        }
    }

    /// Runs the standard pipeline over a prepared context.
    pub async fn run(&self, mut ctx: ConversionContext) -> ConversionOutcome {
        ctx.assign_run_id("conversion");
        let span = self.span(&ctx, "standard");
        self.run_standard(ctx).instrument(span).await
    }

    /// Runs the single-pass domain-specific conversion.
    pub async fn run_domain_specific(&self, mut ctx: ConversionContext) -> ConversionOutcome {
        ctx.assign_run_id("domain_conversion");
        let span = self.span(&ctx, "domain_specific");
        let timer = SpanTimer::start("domain_conversion");
        self.started(&ctx, "domain_specific");

        async {
            let (ctx, outcome) = self
                .stages
                .get(StageKind::DomainSpecificConvert)
                .run(ctx)
                .await
                .into_parts();

            match outcome {
                StageOutcome::Completed(_) => self.complete(ctx, timer, LoopExit::default(), Vec::new()),
                StageOutcome::Failed(failure) => {
                    self.abort(ctx, timer, StageKind::DomainSpecificConvert, failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_standard(&self, mut ctx: ConversionContext) -> ConversionOutcome {
        let timer = SpanTimer::start("conversion");
        self.started(&ctx, "standard");

        for kind in [StageKind::Analyze, StageKind::Convert] {
            let (next, outcome) = self.stages.get(kind).run(ctx).await.into_parts();
            ctx = next;
            if let StageOutcome::Failed(failure) = outcome {
                return self.abort(ctx, timer, kind, failure);
            }
        }

        let mut degraded = Vec::new();
        let max_iterations = self.config.max_iterations;
        let mut exit = LoopExit::default();

        for iteration in 1..=max_iterations {
            exit.iterations_used = iteration;
            info!(iteration, max_iterations, "Starting refinement iteration");

            let (next, outcome) = self.stages.get(StageKind::Validate).run(ctx).await.into_parts();
            ctx = next;
            let is_complete = match outcome {
                StageOutcome::Completed(StagePayload::Validation(report)) => report.is_complete,
                StageOutcome::Completed(_) => ctx.validation.as_ref().is_some_and(|v| v.is_complete),
                StageOutcome::Failed(failure) => {
                    warn!(iteration, error = %failure.message, "Validation failed, leaving refinement loop");
                    exit.interrupted = Some((StageKind::Validate, failure));
                    break;
                }
            };

            let (next, critical) = self.assess_security(ctx, &mut degraded).await;
            ctx = next;
            let complete = is_complete && critical.map_or(true, |count| count == 0);

            self.events.emit(
                PIPELINE_ITERATION,
                serde_json::json!({
                    "run_id": ctx.run_id,
                    "iteration": iteration,
                    "is_complete": is_complete,
                    "critical_vulnerabilities": critical,
                    "complete": complete,
                }),
            );

            if complete {
                info!(iteration, "Conversion complete");
                if self.config.run_integration {
                    ctx = self.best_effort(StageKind::Integrate, ctx, &mut degraded).await;
                }
                return self.complete(ctx, timer, exit, degraded);
            }

            let (next, outcome) = self.stages.get(StageKind::Feedback).run(ctx).await.into_parts();
            ctx = next;
            if let StageOutcome::Failed(failure) = outcome {
                warn!(iteration, error = %failure.message, "Feedback failed, leaving refinement loop");
                exit.interrupted = Some((StageKind::Feedback, failure));
                break;
            }

            if iteration < max_iterations && self.config.iteration_delay_ms > 0 {
                tokio::time::sleep(self.config.iteration_delay()).await;
            }
        }

        exit.max_iterations_reached = exit.interrupted.is_none();
        if exit.max_iterations_reached {
            warn!(max_iterations, "Maximum iterations reached without completion");
        }

        ctx = self.best_effort(StageKind::Validate, ctx, &mut degraded).await;
        ctx = self.assess_security(ctx, &mut degraded).await.0;
        self.complete(ctx, timer, exit, degraded)
    }

    /// Runs the security stage; `None` means it failed to run.
    async fn assess_security(
        &self,
        ctx: ConversionContext,
        degraded: &mut Vec<NonCriticalStageError>,
    ) -> (ConversionContext, Option<usize>) {
        let result = self.stages.get(StageKind::SecurityAssess).run(ctx).await;
        let critical = result.critical_vulnerability_count();
        let (ctx, outcome) = result.into_parts();
        match outcome {
            StageOutcome::Completed(_) => {
                let critical = critical.or_else(|| ctx.critical_vulnerability_count());
                (ctx, critical)
            }
            StageOutcome::Failed(failure) => {
                self.degrade(&ctx, StageKind::SecurityAssess, &failure, degraded);
                (ctx, None)
            }
        }
    }

    async fn best_effort(
        &self,
        kind: StageKind,
        ctx: ConversionContext,
        degraded: &mut Vec<NonCriticalStageError>,
    ) -> ConversionContext {
        let (ctx, outcome) = self.stages.get(kind).run(ctx).await.into_parts();
        if let StageOutcome::Failed(failure) = outcome {
            self.degrade(&ctx, kind, &failure, degraded);
        }
        ctx
    }

    fn degrade(
        &self,
        ctx: &ConversionContext,
        kind: StageKind,
        failure: &StageFailure,
        degraded: &mut Vec<NonCriticalStageError>,
    ) {
        let err = NonCriticalStageError::new(kind.name(), &failure.message);
        warn!(stage = kind.name(), error = %failure.message, "Continuing without best-effort stage");
        let mut data = serde_json::json!(err.to_dict());
        data["run_id"] = serde_json::json!(ctx.run_id);
        self.events.emit(STAGE_DEGRADED, data);
        degraded.push(err);
    }

    fn span(&self, ctx: &ConversionContext, mode: &str) -> tracing::Span {
        let mut attrs = RunSpanAttributes::new(&ctx.run_id).with_mode(mode);
        if let Some(ref metadata) = ctx.metadata {
            attrs = attrs.with_identifier(&metadata.filename);
        }
        attrs.span()
    }

    fn started(&self, ctx: &ConversionContext, mode: &str) {
        info!(run_id = %ctx.run_id, mode, "Conversion started");
        self.events.emit(
            PIPELINE_STARTED,
            serde_json::json!({ "run_id": ctx.run_id, "mode": mode }),
        );
    }

    fn complete(
        &self,
        ctx: ConversionContext,
        timer: SpanTimer,
        exit: LoopExit,
        degraded: Vec<NonCriticalStageError>,
    ) -> ConversionOutcome {
        let duration_ms = timer.finish();
        let stats = self.stats.record(duration_ms, true);
        let (loop_interrupted_by, interruption) = exit.interrupted.unzip();

        info!(
            run_id = %ctx.run_id,
            iterations = exit.iterations_used,
            duration_ms,
            max_iterations_reached = exit.max_iterations_reached,
            total_runs = stats.total,
            "Conversion finished"
        );
        self.events.emit(
            PIPELINE_COMPLETED,
            serde_json::json!({
                "run_id": ctx.run_id,
                "iterations_used": exit.iterations_used,
                "duration_ms": duration_ms,
                "max_iterations_reached": exit.max_iterations_reached,
                "loop_interrupted_by": loop_interrupted_by,
                "degraded_stages": degraded.len(),
            }),
        );

        ConversionOutcome {
            success: true,
            artifact: ctx.artifact.clone(),
            iterations_used: exit.iterations_used,
            duration_ms,
            validation_score: ctx.validation_score(),
            trace: ctx.trace().to_vec(),
            error: None,
            failed_stage: None,
            max_iterations_reached: exit.max_iterations_reached,
            loop_interrupted_by,
            interruption,
            degraded,
            security: ctx.security.clone(),
            critical_vulnerability_count: ctx.critical_vulnerability_count(),
            run_id: ctx.run_id.clone(),
            context: ctx,
        }
    }

    fn abort(
        &self,
        ctx: ConversionContext,
        timer: SpanTimer,
        stage: StageKind,
        failure: StageFailure,
    ) -> ConversionOutcome {
        let duration_ms = timer.finish();
        self.stats.record(duration_ms, false);

        warn!(run_id = %ctx.run_id, stage = stage.name(), error = %failure.message, "Conversion failed");
        self.events.emit(
            PIPELINE_FAILED,
            serde_json::json!({
                "run_id": ctx.run_id,
                "stage": stage.name(),
                "code": failure.code,
                "error": failure.message,
            }),
        );

        ConversionOutcome {
            success: false,
            artifact: ctx.artifact.clone(),
            iterations_used: 0,
            duration_ms,
            validation_score: ctx.validation_score(),
            trace: ctx.trace().to_vec(),
            error: Some(failure.message),
            failed_stage: Some(stage),
            max_iterations_reached: false,
            loop_interrupted_by: None,
            interruption: None,
            degraded: Vec::new(),
            security: ctx.security.clone(),
            critical_vulnerability_count: ctx.critical_vulnerability_count(),
            run_id: ctx.run_id.clone(),
            context: ctx,
        }
    }
}
