//! Audit record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregator::ReviewRound;
use crate::debate::DebateLog;

/// Human decision on a reviewed prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[default]
    Pending,
    Approved,
    Revised,
    Rejected,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Revised => write!(f, "revised"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" | "approve" => Ok(Self::Approved),
            "revised" | "revise" => Ok(Self::Revised),
            "rejected" | "reject" => Ok(Self::Rejected),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Per-reviewer suggestion counters for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerStats {
    pub proposed: u32,
    pub accepted: u32,
    pub rejected: u32,
    pub failed: u32,
}

/// One reviewed prompt. Immutable once appended except for the human
/// decision fields, which a later [`Disposition`] overwrites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub entry_id: Uuid,
    #[serde(flatten)]
    pub round: ReviewRound,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate: Option<DebateLog>,
    #[serde(default)]
    pub suggestions_accepted: Vec<String>,
    #[serde(default)]
    pub suggestions_rejected: Vec<String>,
    #[serde(default)]
    pub rejection_details: String,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default)]
    pub reviewer_stats: BTreeMap<String, ReviewerStats>,
}

impl AuditLogEntry {
    pub fn from_round(round: ReviewRound, debate: Option<DebateLog>) -> Self {
        let reviewer_stats = round
            .reviewer_results
            .iter()
            .map(|r| {
                let stats = ReviewerStats {
                    proposed: r.findings.len() as u32,
                    failed: u32::from(!r.is_healthy()),
                    ..Default::default()
                };
                (r.role.clone(), stats)
            })
            .collect();

        Self {
            entry_id: Uuid::new_v4(),
            round,
            debate,
            suggestions_accepted: Vec::new(),
            suggestions_rejected: Vec::new(),
            rejection_details: String::new(),
            outcome: Outcome::Pending,
            reviewer_stats,
        }
    }

    pub fn prompt_hash(&self) -> &str {
        &self.round.prompt_hash
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.round.timestamp
    }

    /// Overwrite the decision fields and recount per-reviewer acceptance.
    pub fn apply_disposition(&mut self, disposition: &Disposition) {
        self.outcome = disposition.outcome;
        self.suggestions_accepted = disposition.accepted.clone();
        self.suggestions_rejected = disposition.rejected.clone();
        self.rejection_details = disposition.rejection_details.clone();

        for stats in self.reviewer_stats.values_mut() {
            stats.accepted = 0;
            stats.rejected = 0;
        }
        for result in &self.round.reviewer_results {
            let Some(stats) = self.reviewer_stats.get_mut(&result.role) else {
                continue;
            };
            for finding in &result.findings {
                if disposition.accepted.contains(&finding.id) {
                    stats.accepted += 1;
                } else if disposition.rejected.contains(&finding.id) {
                    stats.rejected += 1;
                }
            }
        }
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        let debate = match &self.debate {
            Some(log) => log.summary_line(),
            None => "no debate".to_string(),
        };
        format!("{} | {} | {}", self.round.summary_line(), debate, self.outcome)
    }
}

/// A human decision referencing a previously audited prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disposition {
    pub prompt_hash: String,
    pub outcome: Outcome,
    /// Finding ids the human accepted.
    #[serde(default)]
    pub accepted: Vec<String>,
    #[serde(default)]
    pub rejected: Vec<String>,
    #[serde(default)]
    pub rejection_details: String,
    pub decided_at: DateTime<Utc>,
}

impl Disposition {
    pub fn new(prompt_hash: &str, outcome: Outcome) -> Self {
        Self {
            prompt_hash: prompt_hash.to_string(),
            outcome,
            accepted: Vec::new(),
            rejected: Vec::new(),
            rejection_details: String::new(),
            decided_at: Utc::now(),
        }
    }

    pub fn with_accepted(mut self, ids: Vec<String>) -> Self {
        self.accepted = ids;
        self
    }

    pub fn with_rejected(mut self, ids: Vec<String>, details: &str) -> Self {
        self.rejected = ids;
        self.rejection_details = details.to_string();
        self
    }
}
