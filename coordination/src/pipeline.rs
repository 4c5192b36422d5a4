//! Review pipeline: one call from prompt to audited gate decision.
//!
//! ```text
//! prompt ─▶ run_round ─▶ gate ──────────────────────────────┐
//!                 │                                          ▼
//!                 └─▶ disagreements ─▶ debate (optional) ─▶ audit append
//! ```
//!
//! The gate decision is final once the round is aggregated; debate output
//! only travels to the audit record.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::aggregator::{
    AggregateError, Aggregator, Disagreement, DisagreementPredicate, RoundReport,
    SeverityGapPredicate,
};
use crate::audit::{AuditError, AuditLogEntry, AuditStore, Disposition};
use crate::config::ReviewConfig;
use crate::debate::{DebateLog, DebateRunner};
use crate::finding::GateAction;
use crate::insights::{insights_from_store, PolicyInsights};
use crate::reviewer::ReviewerRegistry;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// The round completed but could not be recorded. The decision is still
    /// available in `outcome`.
    #[error("audit write failed for {}: {source}", .outcome.report.round.prompt_hash)]
    AuditWrite {
        outcome: Box<RoundOutcome>,
        #[source]
        source: AuditError,
    },
}

impl PipelineError {
    /// The computed outcome, if the round got that far.
    pub fn outcome(&self) -> Option<&RoundOutcome> {
        match self {
            Self::AuditWrite { outcome, .. } => Some(outcome),
            Self::Aggregate(_) => None,
        }
    }
}

/// Everything one `review` call produced.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub report: RoundReport,
    pub disagreements: Vec<Disagreement>,
    pub debate: Option<DebateLog>,
    /// Id of the audit entry written for this round.
    pub entry_id: Uuid,
}

impl RoundOutcome {
    pub fn gate_action(&self) -> GateAction {
        self.report.round.gate_action
    }

    pub fn composite_score(&self) -> f64 {
        self.report.round.composite_score
    }

    pub fn prompt_hash(&self) -> &str {
        &self.report.round.prompt_hash
    }
}

/// Prompt → reviewers → aggregate → debate → audit.
pub struct ReviewPipeline {
    registry: ReviewerRegistry,
    aggregator: Aggregator,
    predicate: Box<dyn DisagreementPredicate>,
    debate: Option<DebateRunner>,
    audit: Arc<dyn AuditStore>,
}

impl ReviewPipeline {
    /// Default thresholds, default predicate, no debate.
    pub fn new(registry: ReviewerRegistry, audit: Arc<dyn AuditStore>) -> Self {
        Self {
            registry,
            aggregator: Aggregator::default(),
            predicate: Box::new(SeverityGapPredicate::default()),
            debate: None,
            audit,
        }
    }

    /// Apply gate thresholds and the disagreement trigger from config.
    pub fn with_config(mut self, config: &ReviewConfig) -> Self {
        self.aggregator = Aggregator::new(config.gate);
        self.predicate = Box::new(config.disagreement.predicate());
        self
    }

    pub fn with_predicate(mut self, predicate: Box<dyn DisagreementPredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_debate(mut self, runner: DebateRunner) -> Self {
        self.debate = Some(runner);
        self
    }

    pub fn registry(&self) -> &ReviewerRegistry {
        &self.registry
    }

    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }

    /// Review a prompt and record the round.
    ///
    /// Fails only when no reviewer produced a usable result, or when the
    /// audit write fails (the error still carries the outcome).
    pub async fn review(&self, prompt: &str) -> Result<RoundOutcome, PipelineError> {
        let report = self.aggregator.run_round(prompt, &self.registry).await?;
        let disagreements = self.predicate.disagreements(&report);

        let debate = match &self.debate {
            Some(runner) => runner.run(prompt, &report, &disagreements).await,
            None => None,
        };

        let entry = AuditLogEntry::from_round(report.round.clone(), debate.clone());
        let outcome = RoundOutcome {
            entry_id: entry.entry_id,
            report,
            disagreements,
            debate,
        };

        if let Err(source) = self.audit.append(&entry) {
            error!(
                prompt_hash = %outcome.prompt_hash(),
                error = %source,
                "Failed to append audit entry"
            );
            return Err(PipelineError::AuditWrite {
                outcome: Box::new(outcome),
                source,
            });
        }

        info!(
            prompt_hash = %outcome.prompt_hash(),
            gate = %outcome.gate_action(),
            disagreements = outcome.disagreements.len(),
            debated = outcome.debate.is_some(),
            "Review recorded"
        );
        Ok(outcome)
    }

    /// Record a human decision against an audited prompt.
    pub fn record_decision(&self, disposition: &Disposition) -> Result<(), AuditError> {
        self.audit.record_disposition(disposition)
    }

    /// Per-role insights over the audit window ending at `as_of`.
    pub fn insights(
        &self,
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> Result<BTreeMap<String, PolicyInsights>, AuditError> {
        insights_from_store(self.audit.as_ref(), window_days, as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditResult, MemoryAuditLog, Outcome};
    use crate::finding::{Finding, ReviewerResult, Severity};
    use crate::reviewer::{Reviewer, ReviewerError};
    use async_trait::async_trait;

    struct Fixed {
        role: &'static str,
        severity: Option<Severity>,
        score: f64,
    }

    #[async_trait]
    impl Reviewer for Fixed {
        fn role(&self) -> &str {
            self.role
        }

        fn instructions(&self) -> &str {
            "fixed"
        }

        async fn evaluate(&self, _prompt: &str) -> Result<ReviewerResult, ReviewerError> {
            let findings = self
                .severity
                .map(|s| vec![Finding::new(&format!("{}-1", self.role), self.role, s, "issue")])
                .unwrap_or_default();
            Ok(ReviewerResult::from_findings(self.role, findings, 0.9, self.score))
        }
    }

    struct Broken;

    impl AuditStore for Broken {
        fn append(&self, _entry: &AuditLogEntry) -> AuditResult<()> {
            Err(AuditError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only",
            )))
        }

        fn record_disposition(&self, d: &Disposition) -> AuditResult<()> {
            Err(AuditError::UnknownPrompt(d.prompt_hash.clone()))
        }

        fn entries(&self) -> AuditResult<Vec<AuditLogEntry>> {
            Ok(Vec::new())
        }
    }

    fn registry() -> ReviewerRegistry {
        let mut registry = ReviewerRegistry::new();
        registry.register(Arc::new(Fixed {
            role: "security",
            severity: Some(Severity::Blocker),
            score: 2.0,
        }));
        registry.register(Arc::new(Fixed {
            role: "clarity",
            severity: None,
            score: 9.0,
        }));
        registry
    }

    #[tokio::test]
    async fn test_review_appends_once() {
        let audit = Arc::new(MemoryAuditLog::new());
        let pipeline = ReviewPipeline::new(registry(), audit.clone());

        let outcome = pipeline.review("Build a login form").await.unwrap();
        assert_eq!(outcome.gate_action(), GateAction::Block);
        assert_eq!(outcome.composite_score(), 5.5);
        assert_eq!(outcome.disagreements.len(), 1);
        assert!(outcome.debate.is_none());
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.entries().unwrap()[0].entry_id, outcome.entry_id);
    }

    #[tokio::test]
    async fn test_audit_failure_carries_outcome() {
        let pipeline = ReviewPipeline::new(registry(), Arc::new(Broken));
        let err = pipeline.review("Build a login form").await.unwrap_err();
        let outcome = err.outcome().unwrap();
        assert_eq!(outcome.gate_action(), GateAction::Block);
        assert!(err.to_string().contains("audit write failed"));
    }

    #[tokio::test]
    async fn test_empty_registry_errors() {
        let pipeline =
            ReviewPipeline::new(ReviewerRegistry::new(), Arc::new(MemoryAuditLog::new()));
        let err = pipeline.review("anything").await.unwrap_err();
        assert!(matches!(err, PipelineError::Aggregate(AggregateError::NoReviewers)));
        assert!(err.outcome().is_none());
    }

    #[tokio::test]
    async fn test_load_failure_marks_round_degraded() {
        let mut registry = registry();
        registry.register_loaded(
            "docs",
            Err(ReviewerError::Load {
                role: "docs".into(),
                reason: "definition missing".into(),
            }),
        );
        let pipeline = ReviewPipeline::new(registry, Arc::new(MemoryAuditLog::new()));
        let outcome = pipeline.review("p").await.unwrap();
        assert!(outcome.report.round.is_degraded());
        assert_eq!(outcome.report.round.degraded_roles(), vec!["docs"]);
        assert_eq!(outcome.composite_score(), 5.5);
    }

    #[tokio::test]
    async fn test_record_decision() {
        let audit = Arc::new(MemoryAuditLog::new());
        let pipeline = ReviewPipeline::new(registry(), audit.clone());
        let outcome = pipeline.review("p").await.unwrap();

        pipeline
            .record_decision(&Disposition::new(outcome.prompt_hash(), Outcome::Rejected))
            .unwrap();
        let latest = audit.latest(outcome.prompt_hash()).unwrap().unwrap();
        assert_eq!(latest.outcome, Outcome::Rejected);
    }

    #[tokio::test]
    async fn test_config_thresholds_apply() {
        let config =
            ReviewConfig::from_toml_str("[gate]\nblock_at = \"major\"\nwarn_at = \"nit\"")
                .unwrap();
        let mut registry = ReviewerRegistry::new();
        registry.register(Arc::new(Fixed {
            role: "testing",
            severity: Some(Severity::Major),
            score: 4.0,
        }));
        let pipeline =
            ReviewPipeline::new(registry, Arc::new(MemoryAuditLog::new())).with_config(&config);
        let outcome = pipeline.review("p").await.unwrap();
        assert_eq!(outcome.gate_action(), GateAction::Block);
    }
}
