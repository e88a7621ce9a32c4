//! System instructions and user prompts for each stage.
//!
//! Wording is owned by the caller; [`DefaultPrompts`] is a neutral set for C
//! to Java/Spring conversion that can be replaced through [`PromptSet`].

use super::result::StageKind;
use crate::context::ConversionContext;

/// Source of the instructions a stage sends to the model.
pub trait PromptSet: Send + Sync + std::fmt::Debug {
    /// System instruction associated with the stage.
    fn system_instruction(&self, kind: StageKind) -> String;

    /// User prompt for the stage, built from the current context.
    fn user_prompt(&self, kind: StageKind, ctx: &ConversionContext) -> String;
}

/// Built-in prompt set.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPrompts;

const JSON_ONLY: &str = "Respond with a single JSON object and nothing else.";

impl PromptSet for DefaultPrompts {
    fn system_instruction(&self, kind: StageKind) -> String {
        let role = match kind {
            StageKind::Analyze => {
                "You analyze legacy C code ahead of a migration to Java/Spring. Report \
                 complexity, main_functions, dependencies and conversion_challenges."
            }
            StageKind::Convert => {
                "You convert legacy C code to Java/Spring. Output Java code only, \
                 implementing all functionality and keeping original names."
            }
            StageKind::Validate => {
                "You verify a C to Java/Spring conversion. Report is_complete, \
                 completeness_score (0-1), issues and suggestions."
            }
            StageKind::SecurityAssess => {
                "You assess the security of a C to Java/Spring migration. Report \
                 critical_vulnerabilities, security_risk_issues, \
                 secure_code_recommendations, compliance_gaps and migration_security_notes."
            }
            StageKind::Feedback => {
                "You improve converted Java/Spring code using validation and security \
                 findings. Output the complete improved Java code only."
            }
            StageKind::Integrate => {
                "You combine individually converted Java files into one cohesive Spring \
                 application. Output Java code only."
            }
            StageKind::DomainSpecificConvert => {
                "You convert C data-access code with embedded SQL into MyBatis XML \
                 mappings. Output XML only."
            }
        };

        match kind {
            StageKind::Analyze | StageKind::Validate | StageKind::SecurityAssess => {
                format!("{role}\n{JSON_ONLY}")
            }
            _ => role.to_string(),
        }
    }

    fn user_prompt(&self, kind: StageKind, ctx: &ConversionContext) -> String {
        let artifact = ctx.artifact.as_deref().unwrap_or_default();
        match kind {
            StageKind::Analyze => format!("<c_codebase>\n{}\n</c_codebase>", ctx.source),
            StageKind::Convert => format!("<c_code>\n{}\n</c_code>", ctx.source),
            StageKind::Validate | StageKind::SecurityAssess => format!(
                "<c_code>\n{}\n</c_code>\n<java_code>\n{artifact}\n</java_code>",
                ctx.source
            ),
            StageKind::Feedback => {
                let validation = ctx
                    .validation
                    .as_ref()
                    .and_then(|v| serde_json::to_string_pretty(v).ok())
                    .unwrap_or_default();
                let security = ctx
                    .security
                    .as_ref()
                    .and_then(|s| serde_json::to_string_pretty(s).ok())
                    .unwrap_or_default();
                format!(
                    "<c_code>\n{}\n</c_code>\n<java_code>\n{artifact}\n</java_code>\n\
                     <validation_feedback>\n{validation}\n</validation_feedback>\n\
                     <security_feedback>\n{security}\n</security_feedback>",
                    ctx.source
                )
            }
            StageKind::Integrate => format!(
                "<java_code>\n{artifact}\n</java_code>\n<related_files>\n{}\n</related_files>",
                ctx.related_files.join("\n---\n")
            ),
            StageKind::DomainSpecificConvert => {
                format!("<dbio_code>\n{}\n</dbio_code>", ctx.source)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_stages_ask_for_json() {
        let prompts = DefaultPrompts;
        for kind in [StageKind::Analyze, StageKind::Validate, StageKind::SecurityAssess] {
            assert!(prompts.system_instruction(kind).contains(JSON_ONLY));
        }
        assert!(!prompts.system_instruction(StageKind::Convert).contains(JSON_ONLY));
    }

    #[test]
    fn test_user_prompt_embeds_context() {
        let mut ctx = ConversionContext::new("int add(int a, int b);");
        ctx.artifact = Some("class Add {}".into());
        ctx.related_files = vec!["class Sub {}".into()];

        let prompts = DefaultPrompts;
        let validate = prompts.user_prompt(StageKind::Validate, &ctx);
        assert!(validate.contains("int add"));
        assert!(validate.contains("class Add {}"));

        let integrate = prompts.user_prompt(StageKind::Integrate, &ctx);
        assert!(integrate.contains("class Sub {}"));
    }
}
