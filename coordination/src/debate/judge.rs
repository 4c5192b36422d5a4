//! Judge contract: scores argument quality for both sides of a debate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::Argument;
use crate::finding::Finding;
use crate::generation::{GenerationCost, GenerationError};

/// Errors from a judge capability.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JudgeError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("judge response malformed: {0}")]
    Malformed(String),

    #[error("judge named '{winner}' as winner, expected '{role_a}' or '{role_b}'")]
    UnknownWinner {
        winner: String,
        role_a: String,
        role_b: String,
    },

    #[error("judge gave no feedback for '{0}'")]
    MissingFeedback(String),
}

/// Per-participant feedback from the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeFeedback {
    pub role: String,
    /// 0.0–10.0.
    pub argument_quality_score: f64,
    #[serde(default)]
    pub argument_labels: Vec<String>,
    /// Hint for how this role's instructions should evolve.
    #[serde(default)]
    pub policy_signal: String,
}

/// One side of a debate as presented to the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSide {
    pub role: String,
    pub findings: Vec<Finding>,
    pub argument: String,
}

/// Everything the judge sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    pub prompt: String,
    pub side_a: DebateSide,
    pub side_b: DebateSide,
}

impl JudgeRequest {
    pub fn new(prompt: &str, side_a: DebateSide, side_b: DebateSide) -> Self {
        Self {
            prompt: prompt.to_string(),
            side_a,
            side_b,
        }
    }

    pub fn from_arguments(
        prompt: &str,
        findings_a: Vec<Finding>,
        findings_b: Vec<Finding>,
        a: &Argument,
        b: &Argument,
    ) -> Self {
        Self::new(
            prompt,
            DebateSide {
                role: a.role.clone(),
                findings: findings_a,
                argument: a.text.clone(),
            },
            DebateSide {
                role: b.role.clone(),
                findings: findings_b,
                argument: b.text.clone(),
            },
        )
    }

    pub fn roles(&self) -> (&str, &str) {
        (&self.side_a.role, &self.side_b.role)
    }
}

/// The judge's ruling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    /// Role whose position stands.
    pub winner: String,
    pub feedback: Vec<JudgeFeedback>,
    /// Generation spent reaching the verdict. Never part of the reply.
    #[serde(skip)]
    pub cost: GenerationCost,
}

impl JudgeVerdict {
    /// Check the verdict against the request and normalise it: scores are
    /// clamped to `[0, 10]`, labels trimmed and deduplicated, and feedback is
    /// reordered to `[side_a, side_b]`.
    pub fn normalize(self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let (role_a, role_b) = request.roles();
        if self.winner != role_a && self.winner != role_b {
            return Err(JudgeError::UnknownWinner {
                winner: self.winner,
                role_a: role_a.to_string(),
                role_b: role_b.to_string(),
            });
        }

        let mut ordered = Vec::with_capacity(2);
        for role in [role_a, role_b] {
            let fb = self
                .feedback
                .iter()
                .find(|f| f.role == role)
                .ok_or_else(|| JudgeError::MissingFeedback(role.to_string()))?;
            ordered.push(normalize_feedback(fb.clone()));
        }

        Ok(JudgeVerdict {
            winner: self.winner,
            feedback: ordered,
            cost: self.cost,
        })
    }
}

fn normalize_feedback(mut fb: JudgeFeedback) -> JudgeFeedback {
    fb.argument_quality_score = if fb.argument_quality_score.is_finite() {
        fb.argument_quality_score.clamp(0.0, 10.0)
    } else {
        0.0
    };
    let mut labels: Vec<String> = Vec::new();
    for label in fb.argument_labels {
        let label = label.trim().to_ascii_lowercase();
        if !label.is_empty() && !labels.contains(&label) {
            labels.push(label);
        }
    }
    fb.argument_labels = labels;
    fb.policy_signal = fb.policy_signal.trim().to_string();
    fb
}

/// An impartial judge capability.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JudgeRequest {
        JudgeRequest::new(
            "Build a login form",
            DebateSide {
                role: "security".into(),
                findings: vec![],
                argument: "passwords must be hashed".into(),
            },
            DebateSide {
                role: "clarity".into(),
                findings: vec![],
                argument: "the prompt is clear".into(),
            },
        )
    }

    fn feedback(role: &str, score: f64, labels: &[&str]) -> JudgeFeedback {
        JudgeFeedback {
            role: role.into(),
            argument_quality_score: score,
            argument_labels: labels.iter().map(|l| l.to_string()).collect(),
            policy_signal: format!("  {} signal ", role),
        }
    }

    #[test]
    fn test_normalize_orders_and_clamps() {
        let verdict = JudgeVerdict {
            winner: "security".into(),
            feedback: vec![
                feedback("clarity", -3.0, &["Vague", "vague", " "]),
                feedback("security", 14.0, &["evidence-backed"]),
            ],
            cost: GenerationCost::default(),
        };
        let v = verdict.normalize(&request()).unwrap();
        assert_eq!(v.feedback[0].role, "security");
        assert_eq!(v.feedback[0].argument_quality_score, 10.0);
        assert_eq!(v.feedback[1].argument_quality_score, 0.0);
        assert_eq!(v.feedback[1].argument_labels, vec!["vague".to_string()]);
        assert_eq!(v.feedback[0].policy_signal, "security signal");
    }

    #[test]
    fn test_unknown_winner_rejected() {
        let verdict = JudgeVerdict {
            winner: "testing".into(),
            feedback: vec![feedback("security", 5.0, &[]), feedback("clarity", 5.0, &[])],
            cost: GenerationCost::default(),
        };
        assert!(matches!(
            verdict.normalize(&request()),
            Err(JudgeError::UnknownWinner { .. })
        ));
    }

    #[test]
    fn test_missing_feedback_rejected() {
        let verdict = JudgeVerdict {
            winner: "clarity".into(),
            feedback: vec![feedback("clarity", 5.0, &[])],
            cost: GenerationCost::default(),
        };
        assert_eq!(
            verdict.normalize(&request()),
            Err(JudgeError::MissingFeedback("security".into()))
        );
    }

    #[test]
    fn test_feedback_serde_defaults() {
        let fb: JudgeFeedback =
            serde_json::from_str(r#"{"role":"ux","argument_quality_score":7.5}"#).unwrap();
        assert!(fb.argument_labels.is_empty());
        assert!(fb.policy_signal.is_empty());
    }
}
