//! Aggregator: runs every registered reviewer against a prompt and merges
//! their results into a single round.
//!
//! # Round flow
//!
//! ```text
//! prompt ─┬─ reviewer A ─┐
//!         ├─ reviewer B ─┼─ validate ─ rollup ─ composite ─ gate
//!         └─ reviewer C ─┘    │
//!                             └─ failed / rejected → kept, excluded
//! ```

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::finding::{
    composite_score, Finding, GateAction, GateThresholds, ReviewerResult, Severity,
};
use crate::reviewer::ReviewerRegistry;

/// Stable digest of prompt text, used for correlation and audit lookups.
pub fn prompt_hash(prompt: &str) -> String {
    let hash = blake3::hash(prompt.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Errors that prevent a round from producing a gate decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    #[error("no reviewers registered")]
    NoReviewers,

    #[error("all {failed} reviewers failed; no verdict available")]
    AllReviewersFailed { failed: usize },
}

/// The aggregated outcome of one review round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRound {
    pub prompt_hash: String,
    pub reviewer_results: Vec<ReviewerResult>,
    pub composite_score: f64,
    pub severity_max: Severity,
    pub gate_action: GateAction,
    pub timestamp: DateTime<Utc>,
}

impl ReviewRound {
    /// Results that took part in the rollup.
    pub fn healthy_results(&self) -> impl Iterator<Item = &ReviewerResult> {
        self.reviewer_results.iter().filter(|r| r.is_healthy())
    }

    /// Roles whose results were failed or rejected.
    pub fn degraded_roles(&self) -> Vec<&str> {
        self.reviewer_results
            .iter()
            .filter(|r| !r.is_healthy())
            .map(|r| r.role.as_str())
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.reviewer_results.iter().any(|r| !r.is_healthy())
    }

    pub fn result_for(&self, role: &str) -> Option<&ReviewerResult> {
        self.reviewer_results.iter().find(|r| r.role == role)
    }

    /// Compact status line.
    ///
    /// Example: `[BLOCK] blocker | score 4.00 | 3/3 reviewers | 1a2b3c…`
    pub fn summary_line(&self) -> String {
        let healthy = self.healthy_results().count();
        let mut line = format!(
            "[{}] {} | score {:.2} | {}/{} reviewers",
            self.gate_action.to_string().to_uppercase(),
            self.severity_max,
            self.composite_score,
            healthy,
            self.reviewer_results.len()
        );
        if self.is_degraded() {
            line.push_str(&format!(" | degraded: {}", self.degraded_roles().join(",")));
        }
        line.push_str(&format!(" | {}", self.prompt_hash));
        line
    }
}

/// A round plus the union of its healthy findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: ReviewRound,
    pub findings: Vec<Finding>,
}

impl RoundReport {
    pub fn findings_for(&self, role: &str) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.reviewer_role == role)
            .collect()
    }
}

/// Why two reviewers are considered in disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisagreementReason {
    SeverityGap { gap: u8 },
    ConflictingOps { target: String },
}

/// A pair of reviewers that should debate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disagreement {
    pub role_a: String,
    pub role_b: String,
    pub reason: DisagreementReason,
}

/// Decides which reviewers disagree. Must be deterministic for a given round.
pub trait DisagreementPredicate: Send + Sync {
    fn disagreements(&self, report: &RoundReport) -> Vec<Disagreement>;
}

/// Default trigger: a severity gap of `min_gap` levels or more, or a pair of
/// conflicting suggested operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityGapPredicate {
    pub min_gap: u8,
}

impl Default for SeverityGapPredicate {
    fn default() -> Self {
        Self { min_gap: 2 }
    }
}

impl DisagreementPredicate for SeverityGapPredicate {
    fn disagreements(&self, report: &RoundReport) -> Vec<Disagreement> {
        let mut healthy: Vec<&ReviewerResult> = report.round.healthy_results().collect();
        healthy.sort_by(|a, b| a.role.cmp(&b.role));

        let mut pairs = Vec::new();
        for (i, a) in healthy.iter().enumerate() {
            for b in &healthy[i + 1..] {
                let gap = a.severity_max.gap(b.severity_max);
                if gap >= self.min_gap {
                    pairs.push(Disagreement {
                        role_a: a.role.clone(),
                        role_b: b.role.clone(),
                        reason: DisagreementReason::SeverityGap { gap },
                    });
                } else if let Some(target) = conflicting_target(a, b) {
                    pairs.push(Disagreement {
                        role_a: a.role.clone(),
                        role_b: b.role.clone(),
                        reason: DisagreementReason::ConflictingOps { target },
                    });
                }
            }
        }
        pairs
    }
}

fn conflicting_target(a: &ReviewerResult, b: &ReviewerResult) -> Option<String> {
    let ops_b: Vec<_> = b.findings.iter().flat_map(|f| &f.suggested_ops).collect();
    a.findings
        .iter()
        .flat_map(|f| &f.suggested_ops)
        .find(|op| ops_b.iter().any(|other| op.conflicts_with(other)))
        .map(|op| op.target.trim().to_ascii_lowercase())
}

/// Merges reviewer results into a round.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    thresholds: GateThresholds,
}

impl Aggregator {
    pub fn new(thresholds: GateThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &GateThresholds {
        &self.thresholds
    }

    /// Run every registered reviewer concurrently and aggregate the results.
    pub async fn run_round(
        &self,
        prompt: &str,
        registry: &ReviewerRegistry,
    ) -> Result<RoundReport, AggregateError> {
        if registry.is_empty() && registry.load_failures().is_empty() {
            return Err(AggregateError::NoReviewers);
        }

        let evaluations = registry.iter().map(|(role, reviewer)| async move {
            match reviewer.evaluate(prompt).await {
                Ok(mut result) => {
                    if result.role != role {
                        warn!(
                            role = %role,
                            reported = %result.role,
                            "Reviewer reported a different role; using registered name"
                        );
                        result.role = role.to_string();
                    }
                    result
                }
                Err(e) => {
                    warn!(role = %role, error = %e, "Reviewer failed; recording empty result");
                    ReviewerResult::failed(role, &e.to_string())
                }
            }
        });
        let mut results = join_all(evaluations).await;
        // Roles that never loaded still show up, so the round reads as degraded.
        results.extend(
            registry
                .load_failures()
                .iter()
                .map(|f| ReviewerResult::failed(&f.role, &f.reason)),
        );

        self.aggregate(&prompt_hash(prompt), results)
    }

    /// Aggregate already-collected results. Pure apart from the timestamp.
    pub fn aggregate(
        &self,
        prompt_hash: &str,
        results: Vec<ReviewerResult>,
    ) -> Result<RoundReport, AggregateError> {
        if results.is_empty() {
            return Err(AggregateError::NoReviewers);
        }

        let results: Vec<ReviewerResult> = results
            .into_iter()
            .map(|result| {
                if !result.is_healthy() {
                    return result;
                }
                match result.validate() {
                    Ok(()) => result,
                    Err(violation) => {
                        warn!(
                            role = %result.role,
                            violation = %violation,
                            "Rejecting reviewer result that violates its invariants"
                        );
                        result.rejected(&violation.to_string())
                    }
                }
            })
            .collect();

        let healthy: Vec<&ReviewerResult> = results.iter().filter(|r| r.is_healthy()).collect();
        let scores: Vec<f64> = healthy.iter().map(|r| r.score).collect();
        let composite = match composite_score(&scores) {
            Some(score) => score,
            None => {
                return Err(AggregateError::AllReviewersFailed {
                    failed: results.len(),
                })
            }
        };

        let findings: Vec<Finding> = healthy
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        let rollup = Severity::rollup(findings.iter().map(|f| f.severity));
        let gate_action = self.thresholds.decide(rollup);

        let round = ReviewRound {
            prompt_hash: prompt_hash.to_string(),
            reviewer_results: results,
            composite_score: composite,
            severity_max: rollup.unwrap_or_default(),
            gate_action,
            timestamp: Utc::now(),
        };

        info!(
            prompt_hash = %round.prompt_hash,
            gate = %round.gate_action,
            severity = %round.severity_max,
            score = round.composite_score,
            degraded = round.is_degraded(),
            "Review round aggregated"
        );

        Ok(RoundReport { round, findings })
    }
}
