//! Reviewer adapter: the single capability every specialist exposes, and
//! the registry that maps role names to reviewers.
//!
//! Adding a role means registering another [`Reviewer`]; the aggregator and
//! debate subsystem only ever see role names and results.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::finding::ReviewerResult;
use crate::generation::GenerationError;

/// Errors a reviewer can raise while loading or evaluating.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReviewerError {
    #[error("reviewer '{role}' failed to load: {reason}")]
    Load { role: String, reason: String },

    #[error("reviewer unavailable: {0}")]
    Unavailable(String),

    #[error("reviewer output malformed: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// A specialist that reviews a prompt and returns structured findings.
///
/// Implementations must not share mutable state with other reviewers; the
/// aggregator runs every registered reviewer concurrently.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Stable role name, e.g. `"security"`.
    fn role(&self) -> &str;

    /// The reviewer's live instruction text.
    fn instructions(&self) -> &str;

    /// Review the prompt.
    async fn evaluate(&self, prompt: &str) -> Result<ReviewerResult, ReviewerError>;
}

pub type SharedReviewer = Arc<dyn Reviewer>;

/// A role that was requested but could not be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub role: String,
    pub reason: String,
}

/// Role name → reviewer. Iteration is ordered by role name.
#[derive(Default, Clone)]
pub struct ReviewerRegistry {
    reviewers: BTreeMap<String, SharedReviewer>,
    load_failures: Vec<LoadFailure>,
}

impl ReviewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reviewer under its own role, replacing any previous one.
    pub fn register(&mut self, reviewer: SharedReviewer) -> Option<SharedReviewer> {
        let role = reviewer.role().to_string();
        debug!(role = %role, "Registered reviewer");
        self.reviewers.insert(role, reviewer)
    }

    /// Register the output of a loader. A failed load is recorded and logged
    /// but never propagated, so the remaining roles still run.
    pub fn register_loaded(
        &mut self,
        role: &str,
        loaded: Result<SharedReviewer, ReviewerError>,
    ) -> bool {
        match loaded {
            Ok(reviewer) => {
                self.register(reviewer);
                true
            }
            Err(e) => {
                warn!(role = %role, error = %e, "Reviewer failed to load; continuing without it");
                self.load_failures.push(LoadFailure {
                    role: role.to_string(),
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    pub fn get(&self, role: &str) -> Option<&SharedReviewer> {
        self.reviewers.get(role)
    }

    pub fn roles(&self) -> Vec<&str> {
        self.reviewers.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SharedReviewer)> {
        self.reviewers.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.reviewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reviewers.is_empty()
    }

    /// Roles that failed to load.
    pub fn load_failures(&self) -> &[LoadFailure] {
        &self.load_failures
    }
}

impl std::fmt::Debug for ReviewerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewerRegistry")
            .field("roles", &self.roles())
            .field("load_failures", &self.load_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Reviewer for Fixed {
        fn role(&self) -> &str {
            self.0
        }

        fn instructions(&self) -> &str {
            "review"
        }

        async fn evaluate(&self, _prompt: &str) -> Result<ReviewerResult, ReviewerError> {
            Ok(ReviewerResult::from_findings(self.0, vec![], 1.0, 9.0))
        }
    }

    #[test]
    fn test_registry_orders_roles() {
        let mut registry = ReviewerRegistry::new();
        registry.register(Arc::new(Fixed("testing")));
        registry.register(Arc::new(Fixed("clarity")));
        registry.register(Arc::new(Fixed("security")));
        assert_eq!(registry.roles(), vec!["clarity", "security", "testing"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_register_replaces_same_role() {
        let mut registry = ReviewerRegistry::new();
        assert!(registry.register(Arc::new(Fixed("ux"))).is_none());
        assert!(registry.register(Arc::new(Fixed("ux"))).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_failure_recorded_not_fatal() {
        let mut registry = ReviewerRegistry::new();
        assert!(registry.register_loaded("security", Ok(Arc::new(Fixed("security")))));
        assert!(!registry.register_loaded(
            "docs",
            Err(ReviewerError::Load {
                role: "docs".into(),
                reason: "missing definition".into(),
            })
        ));
        assert_eq!(registry.roles(), vec!["security"]);
        assert_eq!(registry.load_failures().len(), 1);
        assert_eq!(registry.load_failures()[0].role, "docs");
    }

    #[tokio::test]
    async fn test_registered_reviewer_evaluates() {
        let mut registry = ReviewerRegistry::new();
        registry.register(Arc::new(Fixed("clarity")));
        let reviewer = registry.get("clarity").unwrap();
        let result = reviewer.evaluate("anything").await.unwrap();
        assert!(result.no_issues);
    }
}
