//! Mock stages for testing.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::context::ConversionContext;
use crate::errors::ConvertError;
use crate::stages::{Stage, StageKind, StagePayload, StageResult};

/// One scripted reaction of a [`ScriptedStage`].
#[derive(Debug, Clone)]
pub enum Step {
    /// Complete with the payload, applying it to the context.
    Complete(StagePayload),
    /// Fail with an internal error carrying the message.
    Fail(String),
}

/// A stage that plays back a script of steps and counts its calls.
///
/// The last step repeats once the script runs out. Completed payloads are
/// applied to the context the way a real stage would apply them.
#[derive(Debug)]
pub struct ScriptedStage {
    kind: StageKind,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedStage {
    /// Creates a stage that follows `steps`.
    #[must_use]
    pub fn new(kind: StageKind, steps: Vec<Step>) -> Self {
        Self {
            kind,
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Creates a stage that always completes with `payload`.
    #[must_use]
    pub fn completing(kind: StageKind, payload: StagePayload) -> Self {
        Self::new(kind, vec![Step::Complete(payload)])
    }

    /// Sleeps for `delay` before every step.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Option<Step> {
        let next = self.steps.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(step) = next {
            *last = Some(step);
        }
        last.clone()
    }
}

fn apply(ctx: &mut ConversionContext, payload: StagePayload) -> StagePayload {
    match payload {
        StagePayload::Analysis(ref report) => ctx.analysis = Some(report.clone()),
        StagePayload::Artifact { ref text } => ctx.artifact = Some(text.clone()),
        StagePayload::Validation(ref report) => ctx.validation = Some(report.clone()),
        StagePayload::Security(ref report) => ctx.security = Some(report.clone()),
        StagePayload::Feedback { .. } => {
            let issues = ctx
                .validation
                .as_ref()
                .map(|v| v.issues.clone())
                .unwrap_or_default();
            let revision = ctx.feedback_history().len() + 1;
            let artifact = format!(
                "{}\n// revision {revision}",
                ctx.artifact.as_deref().unwrap_or_default()
            );
            let iteration = ctx.record_feedback(issues, artifact);
            return StagePayload::Feedback { iteration };
        }
        StagePayload::Unchanged => {}
    }
    payload
}

#[async_trait]
impl Stage for ScriptedStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, mut ctx: ConversionContext) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        let name = self.kind.name();
        ctx.add_trace(name, "started");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.next_step() {
            Some(Step::Complete(payload)) => {
                let payload = apply(&mut ctx, payload);
                ctx.add_trace(name, "completed");
                StageResult::completed(self.kind, ctx, payload, started_at)
            }
            Some(Step::Fail(message)) => {
                let err = ConvertError::Internal(message);
                ctx.add_trace(name, format!("failed: {err}"));
                StageResult::failed(self.kind, ctx, &err, started_at)
            }
            None => {
                let err = ConvertError::Internal("empty script".to_string());
                ctx.add_trace(name, format!("failed: {err}"));
                StageResult::failed(self.kind, ctx, &err, started_at)
            }
        }
    }
}

/// A stage that always fails.
#[derive(Debug)]
pub struct FailingStage {
    kind: StageKind,
    error: String,
    calls: AtomicUsize,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(kind: StageKind, error: impl Into<String>) -> Self {
        Self {
            kind,
            error: error.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Returns the number of times the stage was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, mut ctx: ConversionContext) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started_at = Utc::now();
        let err = ConvertError::Internal(self.error.clone());
        ctx.add_trace(self.kind.name(), "started");
        ctx.add_trace(self.kind.name(), format!("failed: {err}"));
        StageResult::failed(self.kind, ctx, &err, started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::validation_report;

    #[tokio::test]
    async fn test_scripted_stage_repeats_last_step() {
        let stage = ScriptedStage::new(
            StageKind::Convert,
            vec![
                Step::Fail("first".into()),
                Step::Complete(StagePayload::Artifact { text: "ok".into() }),
            ],
        );

        assert!(!stage.run(ConversionContext::new("s")).await.is_success());
        for _ in 0..2 {
            let result = stage.run(ConversionContext::new("s")).await;
            assert_eq!(result.context.artifact.as_deref(), Some("ok"));
        }
        assert_eq!(stage.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_feedback_records_history() {
        let stage = ScriptedStage::completing(StageKind::Feedback, StagePayload::Feedback { iteration: 0 });
        let mut ctx = ConversionContext::new("s");
        ctx.artifact = Some("class A {}".into());
        ctx.validation = Some(validation_report(false, 0.4));

        let result = stage.run(ctx).await;
        let result = stage.run(result.context).await;

        assert_eq!(result.payload(), Some(&StagePayload::Feedback { iteration: 2 }));
        assert_eq!(result.context.feedback_history().len(), 2);
        assert_eq!(
            result.context.artifact.as_deref(),
            Some("class A {}\n// revision 1\n// revision 2")
        );
    }

    #[tokio::test]
    async fn test_failing_stage() {
        let stage = FailingStage::new(StageKind::Analyze, "boom");
        let result = stage.run(ConversionContext::new("s")).await;

        assert_eq!(result.failure().map(|f| f.code.as_str()), Some("INTERNAL"));
        assert_eq!(stage.call_count(), 1);
        assert_eq!(result.context.trace()[1], "code_analysis: failed: Internal error: boom");
    }
}
