//! Policy insights: windowed aggregation of judge feedback per reviewer
//! role.
//!
//! Pure functions over a snapshot of audit entries. Nothing here is
//! persisted; insights are recomputed whenever they are needed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audit::{window_start, AuditLogEntry, AuditResult, AuditStore};
use crate::finding::round2;

/// Average argument quality below which a role's instructions should be
/// revisited.
pub const NEEDS_UPDATE_THRESHOLD: f64 = 6.0;

/// How often a label was attached to a role's arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFrequency {
    pub label: String,
    pub count: u32,
}

/// Aggregated judge feedback for one role over one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInsights {
    pub role: String,
    pub window_days: u32,
    pub avg_argument_quality: f64,
    /// Most frequent first; ties keep first-seen order.
    pub common_labels: Vec<LabelFrequency>,
    /// First non-empty signal in scan order.
    pub policy_signal: Option<String>,
    pub needs_update: bool,
    pub debate_count: u32,
}

impl PolicyInsights {
    pub fn top_labels(&self, n: usize) -> Vec<&str> {
        self.common_labels
            .iter()
            .take(n)
            .map(|l| l.label.as_str())
            .collect()
    }

    /// Compact status line.
    pub fn summary_line(&self) -> String {
        format!(
            "{} | avg {:.2} over {} debates ({}d){} | labels: {}",
            self.role,
            self.avg_argument_quality,
            self.debate_count,
            self.window_days,
            if self.needs_update { " | NEEDS UPDATE" } else { "" },
            if self.common_labels.is_empty() {
                "-".to_string()
            } else {
                self.top_labels(3).join(", ")
            }
        )
    }
}

#[derive(Default)]
struct RoleAccumulator {
    score_sum: f64,
    count: u32,
    labels: Vec<LabelFrequency>,
    policy_signal: Option<String>,
}

impl RoleAccumulator {
    fn add_label(&mut self, label: &str) {
        match self.labels.iter_mut().find(|l| l.label == label) {
            Some(existing) => existing.count += 1,
            None => self.labels.push(LabelFrequency {
                label: label.to_string(),
                count: 1,
            }),
        }
    }
}

/// Fold judge feedback from `entries` into per-role insights.
///
/// Entries outside `[as_of - window_days, as_of]` are ignored. Entries are
/// scanned in the order given; callers that want "most recent signal wins"
/// pass a newest-first window, as [`AuditStore::window`] returns.
pub fn compute_insights(
    window_days: u32,
    entries: &[AuditLogEntry],
    as_of: DateTime<Utc>,
) -> BTreeMap<String, PolicyInsights> {
    let cutoff = window_start(window_days, as_of);
    let mut acc: BTreeMap<String, RoleAccumulator> = BTreeMap::new();

    for entry in entries {
        let ts = entry.timestamp();
        if ts < cutoff || ts > as_of {
            continue;
        }
        let Some(debate) = &entry.debate else {
            continue;
        };
        for fb in &debate.judge_feedback {
            let role = acc.entry(fb.role.clone()).or_default();
            role.score_sum += fb.argument_quality_score;
            role.count += 1;
            for label in &fb.argument_labels {
                role.add_label(label);
            }
            if role.policy_signal.is_none() && !fb.policy_signal.trim().is_empty() {
                role.policy_signal = Some(fb.policy_signal.trim().to_string());
            }
        }
    }

    acc.into_iter()
        .filter(|(_, a)| a.count > 0)
        .map(|(role, mut a)| {
            let avg = round2(a.score_sum / f64::from(a.count));
            // Stable sort keeps first-seen order among equal counts.
            a.labels.sort_by(|x, y| y.count.cmp(&x.count));
            let insight = PolicyInsights {
                role: role.clone(),
                window_days,
                avg_argument_quality: avg,
                common_labels: a.labels,
                policy_signal: a.policy_signal,
                needs_update: avg < NEEDS_UPDATE_THRESHOLD,
                debate_count: a.count,
            };
            debug!(
                role = %role,
                avg = avg,
                needs_update = insight.needs_update,
                "Computed insight"
            );
            (role, insight)
        })
        .collect()
}

/// Read the window from an audit store and compute insights over it.
pub fn insights_from_store(
    store: &dyn AuditStore,
    window_days: u32,
    as_of: DateTime<Utc>,
) -> AuditResult<BTreeMap<String, PolicyInsights>> {
    let window = store.window(window_days, as_of)?;
    Ok(compute_insights(window_days, &window, as_of))
}
