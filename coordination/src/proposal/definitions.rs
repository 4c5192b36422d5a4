//! Read-only access to the live reviewer definitions.
//!
//! Each role lives at `<root>/<role>.md`: optional YAML frontmatter followed
//! by the instruction text. This handle has no write methods.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use super::error::{ProposalError, ProposalResult};

/// A parsed reviewer definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerDefinition {
    pub role: String,
    pub name: Option<String>,
    pub description: Option<String>,
    /// The body after the frontmatter, trimmed.
    pub instructions: String,
}

#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Role names double as file stems, so they are restricted to a safe set.
pub fn validate_role(role: &str) -> ProposalResult<()> {
    let ok = !role.is_empty()
        && role.len() <= 64
        && role
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(ProposalError::InvalidRole(role.to_string()))
    }
}

/// Split optional `---` frontmatter from the body and parse it.
pub fn parse_definition(role: &str, text: &str) -> ProposalResult<ReviewerDefinition> {
    let text = text.trim_start_matches('\u{feff}');
    let (front, body) = match split_frontmatter(text) {
        Some((front, body)) => {
            let parsed: Frontmatter = if front.trim().is_empty() {
                Frontmatter::default()
            } else {
                serde_yaml::from_str(front).map_err(|e| ProposalError::Frontmatter {
                    role: role.to_string(),
                    reason: e.to_string(),
                })?
            };
            (parsed, body)
        }
        None => (Frontmatter::default(), text),
    };

    Ok(ReviewerDefinition {
        role: role.to_string(),
        name: front.name,
        description: front.description,
        instructions: body.trim().to_string(),
    })
}

fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))?;
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Resolve a path for comparison: canonical when it exists, otherwise
/// absolute with `.`/`..` removed lexically.
pub(crate) fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Read-only handle on the reviewer definition directory.
#[derive(Debug, Clone)]
pub struct ReviewerDefinitions {
    root: PathBuf,
}

impl ReviewerDefinitions {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: resolve_path(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, role: &str) -> PathBuf {
        self.root.join(format!("{}.md", role))
    }

    /// Load one role's definition.
    pub fn load(&self, role: &str) -> ProposalResult<ReviewerDefinition> {
        validate_role(role)?;
        let path = self.path_for(role);
        let text = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProposalError::DefinitionNotFound {
                role: role.to_string(),
                path: path.clone(),
            },
            _ => ProposalError::Io(e),
        })?;
        debug!(role = %role, path = %path.display(), "Loaded reviewer definition");
        parse_definition(role, &text)
    }

    /// Roles with a definition file, sorted.
    pub fn roles(&self) -> ProposalResult<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut roles = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_role(stem).is_ok() {
                    roles.push(stem.to_string());
                }
            }
        }
        roles.sort();
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_role() {
        assert!(validate_role("security").is_ok());
        assert!(validate_role("api_design-2").is_ok());
        assert!(validate_role("").is_err());
        assert!(validate_role("../etc").is_err());
        assert!(validate_role("Security").is_err());
    }

    #[test]
    fn test_parse_with_frontmatter() {
        let text = "---\nname: Security Reviewer\ndescription: Finds injection risks\n---\n\nYou review prompts for security gaps.\n";
        let def = parse_definition("security", text).unwrap();
        assert_eq!(def.name.as_deref(), Some("Security Reviewer"));
        assert_eq!(def.description.as_deref(), Some("Finds injection risks"));
        assert_eq!(def.instructions, "You review prompts for security gaps.");
    }

    #[test]
    fn test_parse_without_frontmatter() {
        let def = parse_definition("clarity", "Check the prompt is unambiguous.").unwrap();
        assert!(def.name.is_none());
        assert_eq!(def.instructions, "Check the prompt is unambiguous.");
    }

    #[test]
    fn test_parse_bad_frontmatter() {
        let err = parse_definition("x", "---\nname: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, ProposalError::Frontmatter { .. }));
    }

    #[test]
    fn test_load_and_list() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("testing.md"), "Ask for tests.").unwrap();
        fs::write(dir.path().join("security.md"), "---\nname: Sec\n---\nBe strict.").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let defs = ReviewerDefinitions::new(dir.path());
        assert_eq!(defs.roles().unwrap(), vec!["security", "testing"]);
        assert_eq!(defs.load("security").unwrap().instructions, "Be strict.");
        assert!(matches!(
            defs.load("ux"),
            Err(ProposalError::DefinitionNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_path_lexical() {
        let resolved = resolve_path(Path::new("/nonexistent/a/./b/../c"));
        assert_eq!(resolved, PathBuf::from("/nonexistent/a/c"));
    }
}
