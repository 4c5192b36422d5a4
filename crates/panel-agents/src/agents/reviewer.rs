//! LLM-backed reviewer driven by a definition file.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use panel_coordination::proposal::ReviewerDefinitions;
use panel_coordination::{
    generate_bounded, Finding, GenerationService, Reviewer, ReviewerError,
    ReviewerRegistry, ReviewerResult, Severity, SuggestedOp,
};
use serde::Deserialize;
use tracing::{debug, info};

use crate::llm::extract_json_object;
use crate::prompts::REVIEWER_OUTPUT_CONTRACT;

#[derive(Debug, Deserialize)]
struct RawFinding {
    severity: Severity,
    issue: String,
    #[serde(default)]
    evidence: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    suggested_ops: Vec<SuggestedOp>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    #[serde(default)]
    findings: Vec<RawFinding>,
    #[serde(default = "default_confidence")]
    confidence: f64,
    score: f64,
}

fn default_confidence() -> f64 {
    0.5
}

/// Parse a reviewer reply into a result for `role`.
///
/// The score is passed through unchanged; the aggregator rejects values
/// outside `[2, 10]`.
pub fn parse_review(role: &str, response: &str) -> Result<ReviewerResult, ReviewerError> {
    let json = extract_json_object(response)
        .ok_or_else(|| ReviewerError::MalformedOutput("no JSON object in reply".into()))?;
    let raw: RawReview =
        serde_json::from_str(json).map_err(|e| ReviewerError::MalformedOutput(e.to_string()))?;

    let findings = raw
        .findings
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let mut finding =
                Finding::new(&format!("{}-{}", role, i + 1), role, f.severity, &f.issue)
                    .with_evidence(&f.evidence)
                    .with_confidence(f.confidence);
            for op in f.suggested_ops {
                finding = finding.with_op(op);
            }
            finding
        })
        .collect();

    Ok(ReviewerResult::from_findings(role, findings, raw.confidence, raw.score))
}

pub struct LlmReviewer {
    role: String,
    instructions: String,
    system: String,
    generation: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl LlmReviewer {
    pub fn new(
        role: &str,
        instructions: &str,
        generation: Arc<dyn GenerationService>,
        timeout: Duration,
    ) -> Self {
        Self {
            role: role.to_string(),
            instructions: instructions.to_string(),
            system: format!("{}\n\n{}", instructions.trim(), REVIEWER_OUTPUT_CONTRACT),
            generation,
            timeout,
        }
    }

    /// Build a reviewer from `<definitions>/<role>.md`.
    pub fn load(
        definitions: &ReviewerDefinitions,
        role: &str,
        generation: Arc<dyn GenerationService>,
        timeout: Duration,
    ) -> Result<Self, ReviewerError> {
        let def = definitions.load(role).map_err(|e| ReviewerError::Load {
            role: role.to_string(),
            reason: e.to_string(),
        })?;
        if def.instructions.is_empty() {
            return Err(ReviewerError::Load {
                role: role.to_string(),
                reason: "definition has no instructions".into(),
            });
        }
        Ok(Self::new(role, &def.instructions, generation, timeout))
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    fn role(&self) -> &str {
        &self.role
    }

    fn instructions(&self) -> &str {
        &self.instructions
    }

    async fn evaluate(&self, prompt: &str) -> Result<ReviewerResult, ReviewerError> {
        let generation =
            generate_bounded(self.generation.as_ref(), &self.system, prompt, self.timeout).await?;
        debug!(role = %self.role, tokens = generation.completion_tokens, "Reviewer replied");
        parse_review(&self.role, &generation.text)
    }
}

/// Register one LLM reviewer per definition file. Roles that fail to load
/// are recorded on the registry and skipped.
pub fn load_llm_panel(
    definitions: &ReviewerDefinitions,
    generation: Arc<dyn GenerationService>,
    timeout: Duration,
) -> Result<ReviewerRegistry, ReviewerError> {
    let roles = definitions.roles().map_err(|e| ReviewerError::Load {
        role: "*".into(),
        reason: e.to_string(),
    })?;

    let mut registry = ReviewerRegistry::new();
    for role in &roles {
        let loaded = LlmReviewer::load(definitions, role, generation.clone(), timeout)
            .map(|r| Arc::new(r) as Arc<dyn Reviewer>);
        registry.register_loaded(role, loaded);
    }
    info!(
        loaded = registry.len(),
        failed = registry.load_failures().len(),
        root = %definitions.root().display(),
        "LLM reviewer panel loaded"
    );
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use panel_coordination::{Generation, GenerationError};
    use tempfile::TempDir;

    #[test]
    fn test_parse_review_full() {
        let reply = r#"```json
        {
          "findings": [
            {"severity": "major", "issue": "No rollback plan", "evidence": "migrate the table",
             "confidence": 0.8, "suggested_ops": [{"kind": "add", "target": "rollback plan"}]},
            {"severity": "nit", "issue": "Typo"}
          ],
          "confidence": 0.75,
          "score": 5.0
        }
        ```"#;
        let result = parse_review("ops", reply).unwrap();
        assert_eq!(result.role, "ops");
        assert_eq!(result.severity_max, Severity::Major);
        assert_eq!(result.findings.len(), 2);
        assert_eq!(result.findings[0].id, "ops-1");
        assert_eq!(result.findings[0].suggested_ops[0].target, "rollback plan");
        assert_eq!(result.findings[1].confidence, 0.5);
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_parse_review_empty_findings() {
        let result = parse_review("ux", r#"{"findings": [], "score": 9}"#).unwrap();
        assert!(result.no_issues);
        assert_eq!(result.severity_max, Severity::Nit);
    }

    #[test]
    fn test_parse_review_malformed() {
        assert!(matches!(
            parse_review("ux", "Looks fine to me!"),
            Err(ReviewerError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_review("ux", r#"{"findings": [{"severity": "critical", "issue": "x"}], "score": 3}"#),
            Err(ReviewerError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_out_of_range_score_left_for_aggregator() {
        let result = parse_review("ux", r#"{"findings": [], "score": 11}"#).unwrap();
        assert!(result.validate().is_err());
    }

    struct Replies(&'static str);

    #[async_trait]
    impl GenerationService for Replies {
        async fn generate(&self, system: &str, _user: &str) -> Result<Generation, GenerationError> {
            assert!(system.contains("## Output format"));
            Ok(Generation::text(self.0))
        }
    }

    #[test]
    fn test_load_llm_panel_records_failures() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("security.md"), "Check for injection.").unwrap();
        std::fs::write(dir.path().join("empty.md"), "---\nname: Empty\n---\n").unwrap();
        let defs = ReviewerDefinitions::new(dir.path());

        let registry = load_llm_panel(
            &defs,
            Arc::new(Replies(r#"{"findings": [], "score": 9}"#)),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(registry.roles(), vec!["security"]);
        assert_eq!(registry.load_failures().len(), 1);
        assert_eq!(registry.load_failures()[0].role, "empty");
    }

    #[tokio::test]
    async fn test_llm_reviewer_evaluates() {
        let reviewer = LlmReviewer::new(
            "security",
            "Check for injection.",
            Arc::new(Replies(
                r#"{"findings": [{"severity": "blocker", "issue": "raw SQL"}], "confidence": 0.9, "score": 2}"#,
            )),
            Duration::from_secs(5),
        );
        assert_eq!(reviewer.instructions(), "Check for injection.");
        let result = reviewer.evaluate("Build SQL from input").await.unwrap();
        assert_eq!(result.severity_max, Severity::Blocker);
        assert_eq!(result.score, 2.0);
    }
}
