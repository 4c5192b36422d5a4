//! Debate: structured argument between reviewers that disagree.
//!
//! Every disagreeing pair runs independently and concurrently. Within a
//! pair the judge only ever sees both finished arguments.
//!
//! # Pair Flow
//!
//! ```text
//! Proposed ──(both sides argue)──▶ Argued ──(judge scores)──▶ Judged
//!    │                               │
//!    └──────(generation down)────────┴──(judge down)──▶ Skipped
//! ```
//!
//! A skipped pair never blocks the round; the gate decision is made before
//! any debate starts.

pub mod judge;
pub mod runner;
pub mod state;

pub use judge::{DebateSide, Judge, JudgeError, JudgeFeedback, JudgeRequest, JudgeVerdict};
pub use runner::{DebateConfig, DebateLog, DebateRunner, PairOutcome, DEFENSE_PREAMBLE};
pub use state::{Argument, PairPhase, PairSession, PairTransition, TransitionError};
