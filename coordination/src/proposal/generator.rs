//! Prompt proposal generator: turns a role's insights into a drafted
//! instruction rewrite for a human to review.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::definitions::ReviewerDefinitions;
use super::error::{ProposalError, ProposalResult};
use super::store::{ProposalFs, ProposalStore};
use crate::generation::{generate_cancellable, GenerationService};
use crate::insights::PolicyInsights;

/// System instructions for drafting a revised reviewer prompt.
pub const DRAFTING_PREAMBLE: &str = "\
You maintain the instructions of a specialist prompt reviewer. \
You are given the reviewer's current instructions and a summary of how a judge rated \
its arguments in recent debates. Rewrite the instructions to address the weaknesses. \
Keep everything that still works. Reply with the full revised instructions only, \
no commentary.";

/// Proposal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProposalConfig {
    /// Deadline for one drafting call, in seconds.
    pub timeout_secs: u64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self { timeout_secs: 120 }
    }
}

impl ProposalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// A drafted instruction rewrite. Never applied automatically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptProposal {
    pub role: String,
    pub current_prompt: String,
    pub proposed_prompt: String,
    pub diff_summary: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insight: Option<PolicyInsights>,
}

impl PromptProposal {
    pub fn to_markdown(&self) -> String {
        let mut md = format!("# Prompt proposal: {}\n\n", self.role);
        md.push_str(&format!(
            "- Generated: {}\n- Status: awaiting human review\n- Diff: {}\n\n",
            self.generated_at.to_rfc3339(),
            self.diff_summary
        ));

        if let Some(insight) = &self.insight {
            md.push_str("## Insight\n\n");
            md.push_str(&format!(
                "- Average argument quality: {:.2} over {} debates ({} days)\n",
                insight.avg_argument_quality, insight.debate_count, insight.window_days
            ));
            if !insight.common_labels.is_empty() {
                let labels: Vec<String> = insight
                    .common_labels
                    .iter()
                    .map(|l| format!("{} ({})", l.label, l.count))
                    .collect();
                md.push_str(&format!("- Common labels: {}\n", labels.join(", ")));
            }
            if let Some(signal) = &insight.policy_signal {
                md.push_str(&format!("- Policy signal: {}\n", signal));
            }
            md.push('\n');
        }

        md.push_str("## Current prompt\n\n````text\n");
        md.push_str(self.current_prompt.trim_end());
        md.push_str("\n````\n\n## Proposed prompt\n\n````text\n");
        md.push_str(self.proposed_prompt.trim_end());
        md.push_str("\n````\n");
        md
    }
}

/// `+added / -removed lines`, counting lines as a multiset.
pub fn diff_summary(current: &str, proposed: &str) -> String {
    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for line in current.lines().map(str::trim_end) {
        *counts.entry(line).or_default() -= 1;
    }
    for line in proposed.lines().map(str::trim_end) {
        *counts.entry(line).or_default() += 1;
    }
    let added: i64 = counts.values().filter(|c| **c > 0).sum();
    let removed: i64 = counts.values().filter(|c| **c < 0).map(|c| -c).sum();
    format!("+{} / -{} lines", added, removed)
}

/// Strip a surrounding Markdown code fence, if the model added one.
fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body_start) = rest.find('\n') else {
        return trimmed;
    };
    let body = &rest[body_start + 1..];
    body.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// What happened to one proposal attempt.
#[derive(Debug)]
pub enum ProposalOutcome {
    /// Drafted and persisted.
    Written {
        path: PathBuf,
        proposal: Box<PromptProposal>,
    },
    /// Drafted, but the store write failed. The failure has been logged.
    Unsaved {
        proposal: Box<PromptProposal>,
        reason: String,
    },
    /// Nothing drafted: definition missing, generation failed, timed out or
    /// was cancelled.
    Abandoned { role: String, reason: String },
}

impl ProposalOutcome {
    pub fn role(&self) -> &str {
        match self {
            Self::Written { proposal, .. } | Self::Unsaved { proposal, .. } => &proposal.role,
            Self::Abandoned { role, .. } => role,
        }
    }

    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Written { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Drafts proposals. Reads only through [`ReviewerDefinitions`], writes
/// only through [`ProposalStore`].
pub struct ProposalGenerator<F: ProposalFs> {
    generation: Arc<dyn GenerationService>,
    definitions: ReviewerDefinitions,
    store: ProposalStore<F>,
    config: ProposalConfig,
}

impl<F: ProposalFs> ProposalGenerator<F> {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        definitions: ReviewerDefinitions,
        store: ProposalStore<F>,
        config: ProposalConfig,
    ) -> Self {
        Self {
            generation,
            definitions,
            store,
            config,
        }
    }

    pub async fn propose(&self, insight: &PolicyInsights) -> ProposalOutcome {
        self.propose_with_cancel(insight, &CancellationToken::new())
            .await
    }

    /// Draft and store one proposal. Cancellation or timeout leaves no file.
    pub async fn propose_with_cancel(
        &self,
        insight: &PolicyInsights,
        cancel: &CancellationToken,
    ) -> ProposalOutcome {
        let proposal = match self.draft(insight, cancel).await {
            Ok(p) => p,
            Err(e) => {
                warn!(role = %insight.role, error = %e, "Proposal abandoned");
                return ProposalOutcome::Abandoned {
                    role: insight.role.clone(),
                    reason: e.to_string(),
                };
            }
        };

        match self.store.write(&proposal) {
            Ok(path) => ProposalOutcome::Written {
                path,
                proposal: Box::new(proposal),
            },
            Err(e) => {
                warn!(role = %proposal.role, error = %e, "Failed to write proposal; continuing");
                ProposalOutcome::Unsaved {
                    proposal: Box::new(proposal),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Draft a proposal for every role whose insight needs an update, in
    /// role order.
    pub async fn propose_all(
        &self,
        insights: &BTreeMap<String, PolicyInsights>,
        cancel: &CancellationToken,
    ) -> Vec<ProposalOutcome> {
        let mut outcomes = Vec::new();
        for insight in insights.values().filter(|i| i.needs_update) {
            if cancel.is_cancelled() {
                break;
            }
            outcomes.push(self.propose_with_cancel(insight, cancel).await);
        }
        info!(
            candidates = insights.values().filter(|i| i.needs_update).count(),
            written = outcomes.iter().filter(|o| o.path().is_some()).count(),
            "Proposal pass complete"
        );
        outcomes
    }

    async fn draft(
        &self,
        insight: &PolicyInsights,
        cancel: &CancellationToken,
    ) -> ProposalResult<PromptProposal> {
        let definition = self.definitions.load(&insight.role)?;
        let user = render_request(&definition.instructions, insight);

        let generation = generate_cancellable(
            self.generation.as_ref(),
            DRAFTING_PREAMBLE,
            &user,
            self.config.timeout(),
            cancel,
        )
        .await?;

        let proposed = strip_fence(&generation.text).to_string();
        if proposed.is_empty() {
            return Err(ProposalError::EmptyDraft(insight.role.clone()));
        }

        Ok(PromptProposal {
            role: insight.role.clone(),
            diff_summary: diff_summary(&definition.instructions, &proposed),
            current_prompt: definition.instructions,
            proposed_prompt: proposed,
            generated_at: Utc::now(),
            insight: Some(insight.clone()),
        })
    }
}

fn render_request(current: &str, insight: &PolicyInsights) -> String {
    let labels = if insight.common_labels.is_empty() {
        "(none)".to_string()
    } else {
        insight
            .common_labels
            .iter()
            .map(|l| format!("{} x{}", l.label, l.count))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "## Reviewer role\n\n{}\n\n## Current instructions\n\n{}\n\n## Judge feedback ({} debates, last {} days)\n\n\
         Average argument quality: {:.2} / 10\nRecurring labels: {}\nPolicy signal: {}",
        insight.role,
        current,
        insight.debate_count,
        insight.window_days,
        insight.avg_argument_quality,
        labels,
        insight.policy_signal.as_deref().unwrap_or("(none)"),
    )
}
