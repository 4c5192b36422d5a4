//! Prompt proposals: drafted instruction rewrites awaiting human approval.
//!
//! ```text
//! ReviewerDefinitions (read-only) ──┐
//!                                   ├─ ProposalGenerator ─▶ ProposalStore (write-only)
//! PolicyInsights ───────────────────┘
//! ```
//!
//! The two roots must be disjoint; [`ProposalStore::new`] refuses otherwise.

pub mod definitions;
pub mod error;
pub mod generator;
pub mod store;

pub use definitions::{parse_definition, validate_role, ReviewerDefinition, ReviewerDefinitions};
pub use error::{ProposalError, ProposalResult};
pub use generator::{
    diff_summary, PromptProposal, ProposalConfig, ProposalGenerator, ProposalOutcome,
    DRAFTING_PREAMBLE,
};
pub use store::{LocalFs, ProposalFs, ProposalStore};
