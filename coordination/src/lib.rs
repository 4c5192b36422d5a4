//! Prompt Review Panel: coordination library
//!
//! This library provides:
//! - A finding/severity model and a configurable gate (`proceed | warn | block`)
//! - A reviewer registry and a concurrent aggregator with composite scoring
//! - Pairwise debate between disagreeing reviewers, scored by a judge
//! - An append-only audit log (JSONL or in-memory)
//! - Windowed policy insights and human-reviewed prompt proposals
//!
//! # Flow
//!
//! ```text
//! prompt ─▶ ReviewerRegistry ─▶ Aggregator ─▶ gate action + composite score
//!                                   │
//!                                   └─▶ disagreements ─▶ DebateRunner ─▶ AuditStore
//!
//! AuditStore ─(window)─▶ compute_insights ─▶ ProposalGenerator ─▶ ProposalStore
//! ```
//!
//! Concrete reviewers, the judge and the HTTP generation client live in the
//! `panel-agents` crate; everything here talks to them through traits.

#![allow(clippy::uninlined_format_args)]

pub mod aggregator;
pub mod audit;
pub mod config;
pub mod debate;
pub mod finding;
pub mod generation;
pub mod insights;
pub mod pipeline;
pub mod proposal;
pub mod reviewer;

// Re-export the finding model
pub use finding::{
    composite_score, Finding, GateAction, GateThresholds, InvariantViolation, OpKind,
    ResultStatus, ReviewerResult, Severity, SuggestedOp, MAX_SCORE, MIN_SCORE,
};

// Re-export reviewer and generation contracts
pub use generation::{
    generate_bounded, generate_cancellable, Generation, GenerationCost, GenerationError,
    GenerationService,
};
pub use reviewer::{LoadFailure, Reviewer, ReviewerError, ReviewerRegistry, SharedReviewer};

// Re-export aggregation types
pub use aggregator::{
    prompt_hash, AggregateError, Aggregator, Disagreement, DisagreementPredicate,
    DisagreementReason, ReviewRound, RoundReport, SeverityGapPredicate,
};

// Re-export debate types
pub use debate::{
    DebateConfig, DebateLog, DebateRunner, Judge, JudgeError, JudgeFeedback, JudgeRequest,
    JudgeVerdict, PairOutcome, PairPhase,
};

// Re-export audit types
pub use audit::{
    AuditError, AuditLogEntry, AuditStore, Disposition, JsonlAuditLog, MemoryAuditLog, Outcome,
    ReviewerStats,
};

// Re-export insight and proposal types
pub use insights::{compute_insights, insights_from_store, PolicyInsights, NEEDS_UPDATE_THRESHOLD};
pub use proposal::{
    LocalFs, PromptProposal, ProposalConfig, ProposalError, ProposalFs, ProposalGenerator,
    ProposalOutcome, ProposalStore, ReviewerDefinitions,
};

// Re-export pipeline and config
pub use config::{ConfigError, ReviewConfig};
pub use pipeline::{PipelineError, ReviewPipeline, RoundOutcome};
