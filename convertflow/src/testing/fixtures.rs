//! Report fixtures and a ready-made scripted stage set.

use std::sync::Arc;

use super::mocks::ScriptedStage;
use crate::stages::{
    AnalysisReport, SecurityReport, StageKind, StagePayload, StageSet, StructuredPayload,
    ValidationReport,
};

/// Builds a validation report as the model would return it.
#[must_use]
pub fn validation_report(is_complete: bool, score: f64) -> ValidationReport {
    let issues: Vec<&str> = if is_complete { Vec::new() } else { vec!["incomplete conversion"] };
    ValidationReport::extract(
        &serde_json::json!({
            "is_complete": is_complete,
            "completeness_score": score,
            "issues": issues,
            "suggestions": [],
        })
        .to_string(),
    )
}

/// Builds a security report with `critical` critical vulnerabilities.
#[must_use]
pub fn security_report(critical: usize) -> SecurityReport {
    let findings: Vec<String> = (1..=critical).map(|n| format!("critical finding {n}")).collect();
    SecurityReport::extract(
        &serde_json::json!({
            "critical_vulnerabilities": findings,
            "security_risk_issues": [],
        })
        .to_string(),
    )
}

/// A stage set whose stages all succeed on the first try.
///
/// Validation reports a complete artifact and security reports no critical
/// vulnerabilities, so a run through it finishes after one iteration.
#[must_use]
pub fn scripted_stage_set() -> StageSet {
    let analysis = AnalysisReport::extract(r#"{"complexity": "simple"}"#);
    let stages = [
        ScriptedStage::completing(StageKind::Analyze, StagePayload::Analysis(analysis)),
        ScriptedStage::completing(
            StageKind::Convert,
            StagePayload::Artifact { text: "public class Converted {}".into() },
        ),
        ScriptedStage::completing(
            StageKind::Validate,
            StagePayload::Validation(validation_report(true, 1.0)),
        ),
        ScriptedStage::completing(
            StageKind::SecurityAssess,
            StagePayload::Security(security_report(0)),
        ),
        ScriptedStage::completing(StageKind::Feedback, StagePayload::Feedback { iteration: 0 }),
        ScriptedStage::completing(StageKind::Integrate, StagePayload::Unchanged),
        ScriptedStage::completing(
            StageKind::DomainSpecificConvert,
            StagePayload::Artifact { text: "<mapper namespace=\"Converted\"/>".into() },
        ),
    ];

    stages
        .into_iter()
        .fold(StageSet::no_op(), |set, stage| set.with_stage(Arc::new(stage)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_report_fixture() {
        let report = validation_report(false, 0.25);
        assert!(!report.parse_failed);
        assert!(!report.is_complete);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn test_security_report_fixture() {
        assert_eq!(security_report(3).critical_count(), 3);
        assert_eq!(security_report(0).critical_count(), 0);
    }
}
