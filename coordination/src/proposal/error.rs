//! Proposal error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::generation::GenerationError;

#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("invalid role name '{0}': use lowercase letters, digits, '-' or '_'")]
    InvalidRole(String),

    #[error("no reviewer definition for '{role}' at {path}")]
    DefinitionNotFound { role: String, path: PathBuf },

    #[error("malformed frontmatter in definition for '{role}': {reason}")]
    Frontmatter { role: String, reason: String },

    #[error("proposal root {proposals} overlaps reviewer definitions root {definitions}")]
    OverlappingRoots {
        definitions: PathBuf,
        proposals: PathBuf,
    },

    #[error("refusing to write outside the proposal root: {0}")]
    OutsideRoot(PathBuf),

    #[error("drafted prompt for '{0}' is empty")]
    EmptyDraft(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("proposal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProposalResult<T> = Result<T, ProposalError>;
