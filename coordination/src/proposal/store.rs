//! Write-only proposal store.
//!
//! The store refuses any root that overlaps the reviewer definitions root,
//! and every write goes to a fresh file name. Existing proposals are never
//! overwritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use super::definitions::{resolve_path, validate_role, ReviewerDefinitions};
use super::error::{ProposalError, ProposalResult};
use super::generator::PromptProposal;

/// Filesystem operations the proposal store needs. Nothing here can read.
pub trait ProposalFs: Send + Sync {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()>;

    /// Create `path` with `contents`. Fails with `AlreadyExists` rather than
    /// replacing an existing file.
    fn write_new(&self, path: &Path, contents: &[u8]) -> io::Result<()>;
}

/// Local disk. Writes land in a temporary sibling first and are then linked
/// into place, so a reader never sees a partial proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl ProposalFs for LocalFs {
    fn create_dir_all(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)
    }

    fn write_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "proposal path has no file name")
            })?;
        let temp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        fs::write(&temp, contents)?;
        // hard_link fails with AlreadyExists instead of clobbering the target.
        let linked = fs::hard_link(&temp, path);
        let cleanup = fs::remove_file(&temp);
        linked?;
        cleanup
    }
}

/// Write-only handle on the proposal directory.
pub struct ProposalStore<F: ProposalFs = LocalFs> {
    root: PathBuf,
    definitions_root: PathBuf,
    fs: F,
}

impl<F: ProposalFs> ProposalStore<F> {
    /// Fails with [`ProposalError::OverlappingRoots`] when either root
    /// contains the other.
    pub fn new(
        root: impl AsRef<Path>,
        definitions: &ReviewerDefinitions,
        fs: F,
    ) -> ProposalResult<Self> {
        let root = resolve_path(root.as_ref());
        let definitions_root = definitions.root().to_path_buf();
        if root.starts_with(&definitions_root) || definitions_root.starts_with(&root) {
            return Err(ProposalError::OverlappingRoots {
                definitions: definitions_root,
                proposals: root,
            });
        }
        Ok(Self {
            root,
            definitions_root,
            fs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Render and persist a proposal, returning where it landed.
    pub fn write(&self, proposal: &PromptProposal) -> ProposalResult<PathBuf> {
        validate_role(&proposal.role)?;

        let file_name = format!(
            "{}-{}-{}.md",
            proposal.role,
            proposal.generated_at.format("%Y%m%dT%H%M%SZ"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.root.join(file_name);
        if !path.starts_with(&self.root) || path.starts_with(&self.definitions_root) {
            return Err(ProposalError::OutsideRoot(path));
        }

        self.fs.create_dir_all(&self.root)?;
        self.fs.write_new(&path, proposal.to_markdown().as_bytes())?;
        info!(role = %proposal.role, path = %path.display(), "Prompt proposal written");
        debug!(diff = %proposal.diff_summary, "Proposal diff");
        Ok(path)
    }
}
