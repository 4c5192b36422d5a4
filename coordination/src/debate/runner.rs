//! Debate runner: drives every disagreeing pair through
//! `Proposed → Argued → Judged` and collects the results into a
//! [`DebateLog`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::judge::{Judge, JudgeFeedback, JudgeRequest};
use super::state::{Argument, PairPhase, PairSession};
use crate::aggregator::{Disagreement, RoundReport};
use crate::finding::Finding;
use crate::generation::{generate_bounded, Generation, GenerationCost, GenerationService};

/// System instructions for a side defending its findings.
pub const DEFENSE_PREAMBLE: &str = "\
You are a specialist prompt reviewer defending your review in a structured debate. \
Another reviewer reached a different conclusion about the same prompt. \
State your position in at most five sentences. Cite concrete evidence from the prompt. \
Do not concede points you can support; do concede points you cannot.";

/// Debate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    /// Whether disagreements trigger a debate at all.
    pub enabled: bool,
    /// Deadline for each generation or judge call, in seconds.
    pub call_timeout_secs: u64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            call_timeout_secs: 60,
        }
    }
}

impl DebateConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }
}

/// Outcome of one pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairOutcome {
    pub role_a: String,
    pub role_b: String,
    /// `None` when the pair was skipped.
    pub winner: Option<String>,
    pub phase: PairPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

/// Record of every debate held in one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebateLog {
    pub pairs: Vec<PairOutcome>,
    pub judge_feedback: Vec<JudgeFeedback>,
    pub cost: GenerationCost,
}

impl DebateLog {
    pub fn feedback_for<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a JudgeFeedback> {
        self.judge_feedback.iter().filter(move |f| f.role == role)
    }

    pub fn judged_count(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.phase == PairPhase::Judged)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.pairs
            .iter()
            .filter(|p| p.phase == PairPhase::Skipped)
            .count()
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        format!(
            "{} pairs | {} judged | {} skipped | {} tokens",
            self.pairs.len(),
            self.judged_count(),
            self.skipped_count(),
            self.cost.total_tokens()
        )
    }
}

struct PairRun {
    outcome: PairOutcome,
    feedback: Vec<JudgeFeedback>,
    cost: GenerationCost,
}

/// Runs debates between disagreeing reviewers.
pub struct DebateRunner {
    generation: Arc<dyn GenerationService>,
    judge: Arc<dyn Judge>,
    config: DebateConfig,
}

impl DebateRunner {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        judge: Arc<dyn Judge>,
        config: DebateConfig,
    ) -> Self {
        Self {
            generation,
            judge,
            config,
        }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Debate every pair concurrently. Returns `None` when there is nothing
    /// to debate. Output order follows `pairs`, not completion order.
    pub async fn run(
        &self,
        prompt: &str,
        report: &RoundReport,
        pairs: &[Disagreement],
    ) -> Option<DebateLog> {
        if pairs.is_empty() || !self.config.enabled {
            return None;
        }

        info!(
            prompt_hash = %report.round.prompt_hash,
            pairs = pairs.len(),
            "Starting reviewer debates"
        );

        let runs = join_all(pairs.iter().map(|d| self.run_pair(prompt, report, d))).await;

        let mut log = DebateLog::default();
        for run in runs {
            log.cost.merge(&run.cost);
            log.judge_feedback.extend(run.feedback);
            log.pairs.push(run.outcome);
        }

        info!(
            prompt_hash = %report.round.prompt_hash,
            summary = %log.summary_line(),
            "Reviewer debates complete"
        );
        Some(log)
    }

    async fn run_pair(
        &self,
        prompt: &str,
        report: &RoundReport,
        disagreement: &Disagreement,
    ) -> PairRun {
        let mut session = PairSession::new(&disagreement.role_a, &disagreement.role_b);
        let mut cost = GenerationCost::default();
        let findings_a: Vec<Finding> = report
            .findings_for(&session.role_a)
            .into_iter()
            .cloned()
            .collect();
        let findings_b: Vec<Finding> = report
            .findings_for(&session.role_b)
            .into_iter()
            .cloned()
            .collect();

        // Argued: both defenses are independent of each other.
        let (arg_a, arg_b) = tokio::join!(
            self.argue(prompt, &session.role_a, &findings_a, &session.role_b, &findings_b),
            self.argue(prompt, &session.role_b, &findings_b, &session.role_a, &findings_a),
        );
        // A side that answered was billed even if the other did not.
        for generation in [&arg_a, &arg_b].into_iter().flatten() {
            cost.record(generation);
        }
        let (arg_a, arg_b) = match (arg_a, arg_b) {
            (Ok(a), Ok(b)) => (a, b),
            (Err(e), _) | (_, Err(e)) => {
                return self.skipped(session, cost, &format!("argument unavailable: {}", e));
            }
        };

        let a = Argument {
            role: session.role_a.clone(),
            text: arg_a.text.trim().to_string(),
        };
        let b = Argument {
            role: session.role_b.clone(),
            text: arg_b.text.trim().to_string(),
        };
        let request = JudgeRequest::from_arguments(prompt, findings_a, findings_b, &a, &b);
        if let Err(e) = session.record_arguments(a, b) {
            return self.skipped(session, cost, &e.to_string());
        }

        // Judged: strictly after both arguments exist.
        let verdict = match tokio::time::timeout(
            self.config.call_timeout(),
            self.judge.judge(&request),
        )
        .await
        {
            Ok(Ok(v)) => {
                cost.merge(&v.cost);
                v.normalize(&request)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                return self.skipped(session, cost, "judge timed out");
            }
        };
        let verdict = match verdict {
            Ok(v) => v,
            Err(e) => return self.skipped(session, cost, &format!("judge failed: {}", e)),
        };

        if let Err(e) = session.transition(
            PairPhase::Judged,
            &format!("{} prevails", verdict.winner),
        ) {
            return self.skipped(session, cost, &e.to_string());
        }
        debug!(pair = %session.status_line(), winner = %verdict.winner, "Pair judged");

        PairRun {
            outcome: PairOutcome {
                role_a: session.role_a,
                role_b: session.role_b,
                winner: Some(verdict.winner),
                phase: PairPhase::Judged,
                skip_reason: None,
            },
            feedback: verdict.feedback,
            cost,
        }
    }

    async fn argue(
        &self,
        prompt: &str,
        role: &str,
        own: &[Finding],
        opponent_role: &str,
        opponent: &[Finding],
    ) -> Result<Generation, crate::generation::GenerationError> {
        let user = format!(
            "## Prompt under review\n\n{}\n\n## Your role\n\n{}\n\n## Your findings\n\n{}\n\n## Opposing reviewer ({})\n\n{}",
            prompt,
            role,
            render_findings(own),
            opponent_role,
            render_findings(opponent),
        );
        generate_bounded(
            self.generation.as_ref(),
            DEFENSE_PREAMBLE,
            &user,
            self.config.call_timeout(),
        )
        .await
    }

    fn skipped(&self, mut session: PairSession, cost: GenerationCost, reason: &str) -> PairRun {
        warn!(
            role_a = %session.role_a,
            role_b = %session.role_b,
            reason = %reason,
            "Debate pair skipped"
        );
        if !session.is_complete() {
            let _ = session.skip(reason);
        }
        PairRun {
            outcome: PairOutcome {
                role_a: session.role_a,
                role_b: session.role_b,
                winner: None,
                phase: PairPhase::Skipped,
                skip_reason: Some(reason.to_string()),
            },
            feedback: Vec::new(),
            cost,
        }
    }
}

fn render_findings(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "(no issues raised)".to_string();
    }
    findings
        .iter()
        .map(|f| {
            if f.evidence.is_empty() {
                format!("- [{}] {}", f.severity, f.issue)
            } else {
                format!("- [{}] {} (evidence: {})", f.severity, f.issue, f.evidence)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
