//! Stage trait and implementations.
//!
//! A stage is one unit of the conversion: it takes the context by value,
//! performs at most a few model calls and hands the mutated context back in
//! a [`StageResult`]. Stages never share a context between runs.

mod llm;
pub mod payload;
pub mod prompts;
mod result;

pub use llm::InferenceStage;
pub use payload::{AnalysisReport, SecurityReport, StructuredPayload, ValidationReport};
pub use prompts::{DefaultPrompts, PromptSet};
pub use result::{StageFailure, StageKind, StageOutcome, StagePayload, StageResult};

use crate::context::ConversionContext;
use crate::inference::InferenceClient;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Which stage of the pipeline this is.
    fn kind(&self) -> StageKind;

    /// Returns the name of the stage.
    fn name(&self) -> &str {
        self.kind().name()
    }

    /// System instruction the stage sends to the model, if any.
    fn system_instruction(&self) -> Option<&str> {
        None
    }

    /// Runs the stage.
    ///
    /// Failures are reported through the returned result, which always
    /// carries the context back to the caller.
    async fn run(&self, ctx: ConversionContext) -> StageResult;
}

/// A function-based stage.
pub struct FnStage<F>
where
    F: Fn(ConversionContext) -> StageResult + Send + Sync,
{
    kind: StageKind,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(ConversionContext) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(kind: StageKind, func: F) -> Self {
        Self { kind, func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(ConversionContext) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("kind", &self.kind).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(ConversionContext) -> StageResult + Send + Sync,
{
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, ctx: ConversionContext) -> StageResult {
        (self.func)(ctx)
    }
}

/// A stage that leaves the context untouched.
#[derive(Debug, Clone, Copy)]
pub struct NoOpStage {
    kind: StageKind,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(kind: StageKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    async fn run(&self, ctx: ConversionContext) -> StageResult {
        StageResult::completed(self.kind, ctx, StagePayload::Unchanged, Utc::now())
    }
}

/// One stage per [`StageKind`], as used by the orchestrator.
#[derive(Debug, Clone)]
pub struct StageSet {
    stages: [Arc<dyn Stage>; 7],
}

impl StageSet {
    /// Builds the inference-backed set sharing one client.
    #[must_use]
    pub fn inference_backed(client: Arc<InferenceClient>, prompts: Arc<dyn PromptSet>) -> Self {
        Self {
            stages: StageKind::ALL.map(|kind| {
                Arc::new(InferenceStage::new(kind, Arc::clone(&client), Arc::clone(&prompts)))
                    as Arc<dyn Stage>
            }),
        }
    }

    /// Builds a set where every stage is a [`NoOpStage`].
    #[must_use]
    pub fn no_op() -> Self {
        Self {
            stages: StageKind::ALL.map(|kind| Arc::new(NoOpStage::new(kind)) as Arc<dyn Stage>),
        }
    }

    /// Replaces the stage registered for `stage.kind()`.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        let slot = Self::slot(stage.kind());
        self.stages[slot] = stage;
        self
    }

    /// Returns the stage for a kind.
    #[must_use]
    pub fn get(&self, kind: StageKind) -> &Arc<dyn Stage> {
        &self.stages[Self::slot(kind)]
    }

    fn slot(kind: StageKind) -> usize {
        match kind {
            StageKind::Analyze => 0,
            StageKind::Convert => 1,
            StageKind::Validate => 2,
            StageKind::SecurityAssess => 3,
            StageKind::Feedback => 4,
            StageKind::Integrate => 5,
            StageKind::DomainSpecificConvert => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_follow_pipeline_order() {
        for (index, kind) in StageKind::ALL.into_iter().enumerate() {
            assert_eq!(StageSet::slot(kind), index);
        }
    }

    #[test]
    fn test_noop_stage_returns_context() {
        let stage = NoOpStage::new(StageKind::Integrate);
        let result = tokio_test::block_on(stage.run(ConversionContext::new("src")));

        assert!(result.is_success());
        assert_eq!(result.payload(), Some(&StagePayload::Unchanged));
        assert_eq!(result.context.source, "src");
    }

    #[tokio::test]
    async fn test_with_stage_replaces_slot() {
        let replacement = FnStage::new(StageKind::Convert, |ctx| {
            StageResult::completed(
                StageKind::Convert,
                ctx,
                StagePayload::Artifact { text: "converted".into() },
                Utc::now(),
            )
        });
        let set = StageSet::no_op().with_stage(Arc::new(replacement));

        let result = set.get(StageKind::Convert).run(ConversionContext::new("src")).await;
        assert_eq!(
            result.payload(),
            Some(&StagePayload::Artifact { text: "converted".into() })
        );
        let untouched = set.get(StageKind::Analyze).run(ConversionContext::new("src")).await;
        assert_eq!(untouched.payload(), Some(&StagePayload::Unchanged));
    }
}
