//! Pair debate state machine: phases, transitions, and per-pair tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a single pairwise debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairPhase {
    /// Both sides' conflicting findings are on the table.
    Proposed,
    /// Each side has produced its defense.
    Argued,
    /// The judge has scored both sides.
    Judged,
    /// Abandoned (generation or judge unavailable).
    Skipped,
}

impl PairPhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Judged | Self::Skipped)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [PairPhase] {
        match self {
            Self::Proposed => &[Self::Argued, Self::Skipped],
            Self::Argued => &[Self::Judged, Self::Skipped],
            Self::Judged | Self::Skipped => &[],
        }
    }
}

impl std::fmt::Display for PairPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Proposed => write!(f, "proposed"),
            Self::Argued => write!(f, "argued"),
            Self::Judged => write!(f, "judged"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairTransition {
    pub from: PairPhase,
    pub to: PairPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: PairPhase,
    pub to: PairPhase,
    pub reason: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for TransitionError {}

/// One side's defense of its findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub role: String,
    pub text: String,
}

/// A debate between two reviewer roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSession {
    pub role_a: String,
    pub role_b: String,
    pub phase: PairPhase,
    pub arguments: Vec<Argument>,
    pub transitions: Vec<PairTransition>,
    pub created_at: DateTime<Utc>,
}

impl PairSession {
    pub fn new(role_a: &str, role_b: &str) -> Self {
        Self {
            role_a: role_a.to_string(),
            role_b: role_b.to_string(),
            phase: PairPhase::Proposed,
            arguments: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: PairPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
                reason: format!(
                    "not a valid transition (allowed: {:?})",
                    self.phase.valid_transitions()
                ),
            });
        }

        self.transitions.push(PairTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Record both arguments and move to `Argued`.
    pub fn record_arguments(&mut self, a: Argument, b: Argument) -> Result<(), TransitionError> {
        self.transition(PairPhase::Argued, "both sides argued")?;
        self.arguments = vec![a, b];
        Ok(())
    }

    /// Abandon the debate from any non-terminal phase.
    pub fn skip(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(PairPhase::Skipped, reason)
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn involves(&self, role: &str) -> bool {
        self.role_a == role || self.role_b == role
    }

    /// The last transition reason, if the pair was skipped.
    pub fn skip_reason(&self) -> Option<&str> {
        if self.phase != PairPhase::Skipped {
            return None;
        }
        self.transitions.last().map(|t| t.reason.as_str())
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} vs {} | {} arguments",
            self.phase,
            self.role_a,
            self.role_b,
            self.arguments.len()
        )
    }
}
