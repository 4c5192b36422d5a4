//! Finding and severity model: shared vocabulary for reviewer output,
//! plus the gate state machine that turns a severity rollup into an action.
//!
//! # Gate mapping (default thresholds)
//!
//! ```text
//! blocker      → block
//! major, minor → warn
//! nit / none   → proceed
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest composite / per-reviewer score.
pub const MIN_SCORE: f64 = 2.0;
/// Highest composite / per-reviewer score.
pub const MAX_SCORE: f64 = 10.0;

/// Severity of a finding. Totally ordered: `nit < minor < major < blocker`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic; never gates.
    #[default]
    Nit,
    /// Worth fixing, not dangerous.
    Minor,
    /// Likely to produce a wrong or harmful result.
    Major,
    /// Must not be executed as written.
    Blocker,
}

impl Severity {
    /// All severities in ascending order.
    pub fn ordered() -> &'static [Self] {
        &[Self::Nit, Self::Minor, Self::Major, Self::Blocker]
    }

    /// Numeric level, `nit = 0` through `blocker = 3`.
    pub fn level(self) -> u8 {
        match self {
            Self::Nit => 0,
            Self::Minor => 1,
            Self::Major => 2,
            Self::Blocker => 3,
        }
    }

    /// Number of levels separating two severities.
    pub fn gap(self, other: Self) -> u8 {
        self.level().abs_diff(other.level())
    }

    /// Maximum over an iterator, `None` when empty.
    pub fn rollup<I: IntoIterator<Item = Severity>>(iter: I) -> Option<Severity> {
        iter.into_iter().max()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nit => write!(f, "nit"),
            Self::Minor => write!(f, "minor"),
            Self::Major => write!(f, "major"),
            Self::Blocker => write!(f, "blocker"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nit" | "info" => Ok(Self::Nit),
            "minor" | "low" => Ok(Self::Minor),
            "major" | "medium" | "high" => Ok(Self::Major),
            "blocker" | "critical" => Ok(Self::Blocker),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

/// Kind of edit a reviewer recommends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Add,
    Remove,
    Rewrite,
}

/// A concrete operation a reviewer suggests applying to the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuggestedOp {
    pub kind: OpKind,
    /// What the operation applies to, e.g. `"input validation"`.
    pub target: String,
}

impl SuggestedOp {
    pub fn add(target: &str) -> Self {
        Self {
            kind: OpKind::Add,
            target: target.to_string(),
        }
    }

    pub fn remove(target: &str) -> Self {
        Self {
            kind: OpKind::Remove,
            target: target.to_string(),
        }
    }

    pub fn rewrite(target: &str) -> Self {
        Self {
            kind: OpKind::Rewrite,
            target: target.to_string(),
        }
    }

    /// Two ops conflict when one adds what the other removes.
    pub fn conflicts_with(&self, other: &SuggestedOp) -> bool {
        let opposite = matches!(
            (self.kind, other.kind),
            (OpKind::Add, OpKind::Remove) | (OpKind::Remove, OpKind::Add)
        );
        opposite && self.target.trim().eq_ignore_ascii_case(other.target.trim())
    }
}

impl std::fmt::Display for SuggestedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.kind {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Rewrite => "rewrite",
        };
        write!(f, "{} {}", verb, self.target)
    }
}

/// A single structured issue raised by a reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub reviewer_role: String,
    pub severity: Severity,
    /// Reviewer confidence in this finding (0.0–1.0).
    pub confidence: f64,
    pub issue: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    pub suggested_ops: Vec<SuggestedOp>,
}

impl Finding {
    /// Create a finding with full confidence and no evidence.
    pub fn new(id: &str, reviewer_role: &str, severity: Severity, issue: &str) -> Self {
        Self {
            id: id.to_string(),
            reviewer_role: reviewer_role.to_string(),
            severity,
            confidence: 1.0,
            issue: issue.to_string(),
            evidence: String::new(),
            suggested_ops: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: &str) -> Self {
        self.evidence = evidence.to_string();
        self
    }

    /// Set confidence, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_op(mut self, op: SuggestedOp) -> Self {
        self.suggested_ops.push(op);
        self
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}] {}", self.severity, self.reviewer_role, self.issue)
    }
}

/// Whether a reviewer result can participate in the rollup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Ok,
    /// The reviewer errored or could not be reached.
    Failed { reason: String },
    /// The reviewer answered, but its result broke an invariant.
    Rejected { reason: String },
}

impl ResultStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Output of one reviewer for one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerResult {
    pub role: String,
    pub findings: Vec<Finding>,
    pub severity_max: Severity,
    /// Overall confidence (0.0–1.0).
    pub confidence: f64,
    /// Quality score for the prompt, `MIN_SCORE..=MAX_SCORE`.
    pub score: f64,
    pub no_issues: bool,
    #[serde(default)]
    pub status: ResultStatus,
}

impl ReviewerResult {
    /// Build a healthy result, deriving `severity_max` and `no_issues` from
    /// the findings.
    pub fn from_findings(role: &str, findings: Vec<Finding>, confidence: f64, score: f64) -> Self {
        let severity_max =
            Severity::rollup(findings.iter().map(|f| f.severity)).unwrap_or_default();
        let no_issues = findings.is_empty();
        Self {
            role: role.to_string(),
            findings,
            severity_max,
            confidence: clamp_unit(confidence),
            score,
            no_issues,
            status: ResultStatus::Ok,
        }
    }

    /// Placeholder for a reviewer that errored: no issues, zero confidence.
    pub fn failed(role: &str, reason: &str) -> Self {
        Self {
            role: role.to_string(),
            findings: Vec::new(),
            severity_max: Severity::Nit,
            confidence: 0.0,
            score: MIN_SCORE,
            no_issues: true,
            status: ResultStatus::Failed {
                reason: reason.to_string(),
            },
        }
    }

    /// Replace this result with a rejected placeholder, keeping the role.
    pub fn rejected(self, reason: &str) -> Self {
        Self {
            status: ResultStatus::Rejected {
                reason: reason.to_string(),
            },
            ..Self::failed(&self.role, reason)
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    /// Severity implied by the findings themselves.
    pub fn computed_severity_max(&self) -> Severity {
        Severity::rollup(self.findings.iter().map(|f| f.severity)).unwrap_or_default()
    }

    /// Check the result's internal invariants.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let computed = self.computed_severity_max();
        if computed != self.severity_max {
            return Err(InvariantViolation::SeverityMismatch {
                declared: self.severity_max,
                computed,
            });
        }
        if !self.score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            return Err(InvariantViolation::ScoreOutOfRange(self.score));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(InvariantViolation::ConfidenceOutOfRange(self.confidence));
        }
        if let Some(f) = self
            .findings
            .iter()
            .find(|f| !(0.0..=1.0).contains(&f.confidence))
        {
            return Err(InvariantViolation::ConfidenceOutOfRange(f.confidence));
        }
        Ok(())
    }
}

/// A reviewer result that contradicts itself.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvariantViolation {
    #[error("severity_max is {declared} but findings imply {computed}")]
    SeverityMismatch {
        declared: Severity,
        computed: Severity,
    },
    #[error("score {0} outside [2, 10]")]
    ScoreOutOfRange(f64),
    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Pipeline-level decision for a reviewed prompt. Ordered from most to least
/// permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Proceed,
    Warn,
    Block,
}

impl std::fmt::Display for GateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proceed => write!(f, "proceed"),
            Self::Warn => write!(f, "warn"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// Configurable severity thresholds for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    /// Lowest severity that produces `warn`.
    pub warn_at: Severity,
    /// Lowest severity that produces `block`.
    pub block_at: Severity,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            warn_at: Severity::Minor,
            block_at: Severity::Blocker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("warn threshold {warn_at} is above block threshold {block_at}")]
pub struct ThresholdError {
    pub warn_at: Severity,
    pub block_at: Severity,
}

impl GateThresholds {
    pub fn validate(&self) -> Result<(), ThresholdError> {
        if self.warn_at > self.block_at {
            return Err(ThresholdError {
                warn_at: self.warn_at,
                block_at: self.block_at,
            });
        }
        Ok(())
    }

    /// Map a severity rollup to a gate action. `None` means no findings at
    /// all, which always proceeds.
    pub fn decide(&self, severity_max: Option<Severity>) -> GateAction {
        match severity_max {
            None => GateAction::Proceed,
            Some(s) if s >= self.block_at => GateAction::Block,
            Some(s) if s >= self.warn_at => GateAction::Warn,
            Some(_) => GateAction::Proceed,
        }
    }
}

/// Mean of the scores, clamped to `[MIN_SCORE, MAX_SCORE]` and rounded to two
/// decimals. `None` when there are no scores.
pub fn composite_score(scores: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    Some(round2(mean.clamp(MIN_SCORE, MAX_SCORE)))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Severity::Nit < Severity::Minor);
        assert!(Severity::Minor < Severity::Major);
        assert!(Severity::Major < Severity::Blocker);
        assert_eq!(Severity::Blocker.gap(Severity::Minor), 2);
        assert_eq!(Severity::Nit.gap(Severity::Nit), 0);
    }

    #[test]
    fn test_severity_serde() {
        let json = serde_json::to_string(&Severity::Blocker).unwrap();
        assert_eq!(json, "\"blocker\"");
        let parsed: Severity = serde_json::from_str("\"minor\"").unwrap();
        assert_eq!(parsed, Severity::Minor);
    }

    #[test]
    fn test_severity_from_str_aliases() {
        assert_eq!("critical".parse::<Severity>().unwrap(), Severity::Blocker);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::Major);
        assert!("urgent".parse::<Severity>().is_err());
    }

    #[test]
    fn test_default_gate_mapping() {
        let gate = GateThresholds::default();
        assert_eq!(gate.decide(Some(Severity::Blocker)), GateAction::Block);
        assert_eq!(gate.decide(Some(Severity::Major)), GateAction::Warn);
        assert_eq!(gate.decide(Some(Severity::Minor)), GateAction::Warn);
        assert_eq!(gate.decide(Some(Severity::Nit)), GateAction::Proceed);
        assert_eq!(gate.decide(None), GateAction::Proceed);
    }

    #[test]
    fn test_gate_monotonic_for_any_valid_thresholds() {
        for &warn_at in Severity::ordered() {
            for &block_at in Severity::ordered() {
                let gate = GateThresholds { warn_at, block_at };
                if gate.validate().is_err() {
                    continue;
                }
                for pair in Severity::ordered().windows(2) {
                    assert!(
                        gate.decide(Some(pair[0])) <= gate.decide(Some(pair[1])),
                        "{:?} not monotonic at {} → {}",
                        gate,
                        pair[0],
                        pair[1]
                    );
                }
            }
        }
    }

    #[test]
    fn test_thresholds_reject_inverted() {
        let gate = GateThresholds {
            warn_at: Severity::Blocker,
            block_at: Severity::Major,
        };
        assert!(gate.validate().is_err());
    }

    #[test]
    fn test_stricter_major_threshold() {
        let gate = GateThresholds {
            warn_at: Severity::Minor,
            block_at: Severity::Major,
        };
        assert_eq!(gate.decide(Some(Severity::Major)), GateAction::Block);
        assert_eq!(gate.decide(Some(Severity::Minor)), GateAction::Warn);
    }

    #[test]
    fn test_composite_clamping() {
        assert_eq!(composite_score(&[]), None);
        assert_eq!(composite_score(&[0.0, 1.0]), Some(MIN_SCORE));
        assert_eq!(composite_score(&[50.0, 12.0]), Some(MAX_SCORE));
        assert_eq!(composite_score(&[7.0, 8.0, 8.0]), Some(7.67));
        for scores in [vec![-100.0], vec![1e9, 1e9], vec![2.0, 10.0, f64::NAN]] {
            let score = composite_score(&scores).unwrap();
            assert!((MIN_SCORE..=MAX_SCORE).contains(&score));
        }
    }

    #[test]
    fn test_result_from_findings() {
        let result = ReviewerResult::from_findings(
            "security",
            vec![
                Finding::new("s-1", "security", Severity::Minor, "vague scope"),
                Finding::new("s-2", "security", Severity::Blocker, "raw SQL"),
            ],
            0.9,
            3.0,
        );
        assert_eq!(result.severity_max, Severity::Blocker);
        assert!(!result.no_issues);
        assert!(result.validate().is_ok());
    }

    #[test]
    fn test_result_severity_mismatch_detected() {
        let mut result = ReviewerResult::from_findings(
            "testing",
            vec![Finding::new("t-1", "testing", Severity::Major, "no tests")],
            0.8,
            5.0,
        );
        result.severity_max = Severity::Nit;
        assert_eq!(
            result.validate(),
            Err(InvariantViolation::SeverityMismatch {
                declared: Severity::Nit,
                computed: Severity::Major,
            })
        );
    }

    #[test]
    fn test_result_score_out_of_range() {
        let result = ReviewerResult::from_findings("clarity", vec![], 0.5, 11.0);
        assert_eq!(
            result.validate(),
            Err(InvariantViolation::ScoreOutOfRange(11.0))
        );
    }

    #[test]
    fn test_failed_and_rejected_placeholders() {
        let failed = ReviewerResult::failed("ux", "timeout");
        assert!(!failed.is_healthy());
        assert!(failed.no_issues);
        assert_eq!(failed.confidence, 0.0);

        let rejected = ReviewerResult::from_findings(
            "docs",
            vec![Finding::new("d-1", "docs", Severity::Major, "x")],
            0.9,
            4.0,
        )
        .rejected("bad severity");
        assert_eq!(rejected.role, "docs");
        assert!(rejected.findings.is_empty());
        assert!(matches!(rejected.status, ResultStatus::Rejected { .. }));
    }

    #[test]
    fn test_op_conflicts() {
        let add = SuggestedOp::add("Input Validation");
        let remove = SuggestedOp::remove("input validation");
        assert!(add.conflicts_with(&remove));
        assert!(remove.conflicts_with(&add));
        assert!(!add.conflicts_with(&SuggestedOp::add("input validation")));
        assert!(!add.conflicts_with(&SuggestedOp::remove("logging")));
        assert!(!SuggestedOp::rewrite("x").conflicts_with(&SuggestedOp::remove("x")));
    }

    #[test]
    fn test_finding_confidence_clamped() {
        let f = Finding::new("x", "r", Severity::Nit, "i").with_confidence(1.7);
        assert_eq!(f.confidence, 1.0);
        let g = Finding::new("x", "r", Severity::Nit, "i").with_confidence(f64::NAN);
        assert_eq!(g.confidence, 0.0);
    }

    #[test]
    fn test_status_serde_tagged() {
        let json = serde_json::to_string(&ResultStatus::Failed {
            reason: "boom".into(),
        })
        .unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        let parsed: ResultStatus = serde_json::from_str("{\"state\":\"ok\"}").unwrap();
        assert_eq!(parsed, ResultStatus::Ok);
    }
}
