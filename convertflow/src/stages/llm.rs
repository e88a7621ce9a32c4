//! Inference-backed stage implementation shared by every [`StageKind`].

use super::payload::{AnalysisReport, SecurityReport, StructuredPayload, ValidationReport};
use super::prompts::PromptSet;
use super::result::{StageKind, StagePayload, StageResult};
use super::Stage;
use crate::context::ConversionContext;
use crate::errors::{ConvertError, PreconditionError};
use crate::inference::InferenceClient;
use crate::observability::SpanTimer;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

/// A stage that asks the model to perform one step of the conversion.
///
/// The behavior is selected by `kind`: structured stages (analysis,
/// validation, security) use a single round trip and parse a payload, the
/// others use continuation and stitching to produce an artifact.
#[derive(Debug)]
pub struct InferenceStage {
    kind: StageKind,
    client: Arc<InferenceClient>,
    prompts: Arc<dyn PromptSet>,
    system: String,
}

impl InferenceStage {
    /// Creates a stage of the given kind.
    #[must_use]
    pub fn new(kind: StageKind, client: Arc<InferenceClient>, prompts: Arc<dyn PromptSet>) -> Self {
        let system = prompts.system_instruction(kind);
        Self {
            kind,
            client,
            prompts,
            system,
        }
    }

    fn require(&self, present: bool, missing: &str) -> Result<(), ConvertError> {
        if present {
            Ok(())
        } else {
            Err(PreconditionError::new(self.kind.name(), missing).into())
        }
    }

    async fn apply(&self, ctx: &mut ConversionContext) -> Result<StagePayload, ConvertError> {
        match self.kind {
            StageKind::Analyze => {
                let text = self.simple(ctx).await?;
                let report = AnalysisReport::extract(&text);
                info!(complexity = %report.complexity, parse_failed = report.parse_failed, "Analysis completed");
                ctx.analysis = Some(report.clone());
                Ok(StagePayload::Analysis(report))
            }
            StageKind::Convert | StageKind::DomainSpecificConvert => {
                let text = self.stitched(ctx).await?;
                ctx.artifact = Some(text.clone());
                Ok(StagePayload::Artifact { text })
            }
            StageKind::Validate => {
                self.require(ctx.artifact.is_some(), "produced artifact")?;
                let text = self.simple(ctx).await?;
                let report = ValidationReport::extract(&text);
                info!(
                    is_complete = report.is_complete,
                    score = report.completeness_score,
                    parse_failed = report.parse_failed,
                    "Validation completed"
                );
                ctx.validation = Some(report.clone());
                Ok(StagePayload::Validation(report))
            }
            StageKind::SecurityAssess => {
                self.require(ctx.artifact.is_some(), "produced artifact")?;
                let text = self.simple(ctx).await?;
                let report = SecurityReport::extract(&text);
                info!(
                    critical = report.critical_count(),
                    risk_issues = report.security_risk_issues.len(),
                    "Security assessment completed"
                );
                ctx.security = Some(report.clone());
                Ok(StagePayload::Security(report))
            }
            StageKind::Feedback => {
                self.require(ctx.artifact.is_some(), "produced artifact")?;
                let issues = match ctx.validation {
                    Some(ref validation) => validation.issues.clone(),
                    None => return Err(PreconditionError::new(self.kind.name(), "validation results").into()),
                };
                let improved = self.stitched(ctx).await?;
                let iteration = ctx.record_feedback(issues, improved);
                info!(iteration, "Feedback applied");
                Ok(StagePayload::Feedback { iteration })
            }
            StageKind::Integrate => {
                if ctx.related_files.is_empty() {
                    info!("Single file conversion, no integration needed");
                    return Ok(StagePayload::Unchanged);
                }
                let text = self.stitched(ctx).await?;
                ctx.artifact = Some(text.clone());
                Ok(StagePayload::Artifact { text })
            }
        }
    }

    async fn simple(&self, ctx: &ConversionContext) -> Result<String, ConvertError> {
        let prompt = self.prompts.user_prompt(self.kind, ctx);
        Ok(self.client.simple_generate(&prompt, &self.system).await?)
    }

    async fn stitched(&self, ctx: &ConversionContext) -> Result<String, ConvertError> {
        let prompt = self.prompts.user_prompt(self.kind, ctx);
        Ok(self.client.generate_stitched(&prompt, &self.system).await?)
    }
}

#[async_trait]
impl Stage for InferenceStage {
    fn kind(&self) -> StageKind {
        self.kind
    }

    fn system_instruction(&self) -> Option<&str> {
        Some(&self.system)
    }

    async fn run(&self, mut ctx: ConversionContext) -> StageResult {
        let name = self.kind.name();
        let started_at = Utc::now();
        let timer = SpanTimer::start(name);
        ctx.add_trace(name, "started");
        info!(stage = name, run_id = %ctx.run_id, "Stage started");

        match self.apply(&mut ctx).await {
            Ok(payload) => {
                ctx.add_trace(name, "completed");
                info!(stage = name, duration_ms = timer.finish(), "Stage completed");
                StageResult::completed(self.kind, ctx, payload, started_at)
            }
            Err(err) => {
                ctx.add_trace(name, format!("failed: {err}"));
                error!(stage = name, code = err.code(), error = %err, duration_ms = timer.finish(), "Stage failed");
                StageResult::failed(self.kind, ctx, &err, started_at)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InferenceConfig;
    use crate::inference::{InferenceResponse, ModelTransport, StopReason};
    use crate::stages::prompts::DefaultPrompts;
    use crate::stages::StageOutcome;
    use crate::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn stage(kind: StageKind, responses: Vec<InferenceResponse>) -> (InferenceStage, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(responses));
        let client = Arc::new(InferenceClient::new(
            Arc::clone(&transport) as Arc<dyn ModelTransport>,
            &InferenceConfig::default(),
        ));
        (InferenceStage::new(kind, client, Arc::new(DefaultPrompts)), transport)
    }

    fn complete(text: &str) -> InferenceResponse {
        InferenceResponse::new(text, StopReason::Complete)
    }

    #[tokio::test]
    async fn test_analysis_sets_report() {
        let (stage, _) = stage(
            StageKind::Analyze,
            vec![complete(r#"Sure! {"complexity": "simple", "main_functions": ["add"]}"#)],
        );

        let result = stage.run(ConversionContext::new("int add(int a, int b);")).await;

        assert!(result.is_success());
        let analysis = result.context.analysis.as_ref().unwrap();
        assert_eq!(analysis.complexity, "simple");
        assert_eq!(result.context.trace(), ["code_analysis: started", "code_analysis: completed"]);
    }

    #[tokio::test]
    async fn test_malformed_validation_still_succeeds() {
        let (stage, _) = stage(
            StageKind::Validate,
            vec![complete(r#"{"is_complete": true, "completeness_score": 1.0"#)],
        );
        let mut ctx = ConversionContext::new("src");
        ctx.artifact = Some("class A {}".into());

        let result = stage.run(ctx).await;

        assert!(result.is_success());
        match result.payload() {
            Some(StagePayload::Validation(report)) => {
                assert!(report.parse_failed);
                assert!(!report.is_complete);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(result.context.validation.as_ref().unwrap().parse_failed);
    }

    #[tokio::test]
    async fn test_validation_without_artifact_fails_fast() {
        let (stage, transport) = stage(StageKind::Validate, vec![complete("{}")]);

        let result = stage.run(ConversionContext::new("src")).await;

        assert!(!result.is_success());
        assert_eq!(transport.call_count(), 0);
        assert_eq!(result.failure().unwrap().code, "PRECONDITION");
        assert_eq!(result.context.trace().len(), 2);
        assert!(result.context.trace()[1].starts_with("validation: failed: "));
    }

    #[tokio::test]
    async fn test_feedback_requires_validation() {
        let (stage, transport) = stage(StageKind::Feedback, vec![complete("class B {}")]);
        let mut ctx = ConversionContext::new("src");
        ctx.artifact = Some("class A {}".into());

        let result = stage.run(ctx).await;

        assert!(matches!(result.outcome, StageOutcome::Failed(_)));
        assert_eq!(transport.call_count(), 0);
        assert!(result.error().unwrap().contains("validation results"));
    }

    #[tokio::test]
    async fn test_feedback_records_entry_and_replaces_artifact() {
        let (stage, _) = stage(StageKind::Feedback, vec![complete("class Improved {}")]);
        let mut ctx = ConversionContext::new("src");
        ctx.artifact = Some("class A {}".into());
        ctx.validation = Some(ValidationReport::extract(
            r#"{"is_complete": false, "issues": ["missing sub()"]}"#,
        ));

        let result = stage.run(ctx).await;

        assert_eq!(result.payload(), Some(&StagePayload::Feedback { iteration: 1 }));
        assert_eq!(result.context.artifact.as_deref(), Some("class Improved {}"));
        let entry = &result.context.feedback_history()[0];
        assert_eq!(entry.issues_addressed, vec![serde_json::json!("missing sub()")]);
    }

    #[tokio::test]
    async fn test_conversion_uses_continuation() {
        let (stage, transport) = stage(
            StageKind::Convert,
            vec![
                InferenceResponse::new("class A {\n  int x;\n  int", StopReason::LengthTruncated),
                complete("  int y;\n}"),
            ],
        );

        let result = stage.run(ConversionContext::new("struct a { int x; int y; };")).await;

        assert_eq!(transport.call_count(), 2);
        assert_eq!(result.context.artifact.as_deref(), Some("class A {\n  int x;  int y;\n}"));
    }

    #[tokio::test]
    async fn test_integration_without_related_files_is_noop() {
        let (stage, transport) = stage(StageKind::Integrate, Vec::new());
        let mut ctx = ConversionContext::new("src");
        ctx.artifact = Some("class A {}".into());

        let result = stage.run(ctx).await;

        assert!(result.is_success());
        assert_eq!(result.payload(), Some(&StagePayload::Unchanged));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(result.context.artifact.as_deref(), Some("class A {}"));
    }

    #[tokio::test]
    async fn test_inference_failure_is_reported() {
        let (stage, _) = stage(StageKind::Convert, Vec::new());

        let result = stage.run(ConversionContext::new("src")).await;

        assert_eq!(result.failure().unwrap().code, "INFERENCE");
        assert!(result.context.artifact.is_none());
    }

    #[test]
    fn test_system_instruction_is_bound_at_construction() {
        let (stage, _) = stage(StageKind::SecurityAssess, Vec::new());
        assert!(stage.system_instruction().unwrap().contains("critical_vulnerabilities"));
        assert_eq!(stage.name(), "security_assessment");
    }
}
