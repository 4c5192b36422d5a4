//! Review configuration, loadable from TOML.
//!
//! ```toml
//! [gate]
//! warn_at = "minor"
//! block_at = "blocker"
//!
//! [disagreement]
//! min_gap = 2
//!
//! [debate]
//! enabled = true
//! call_timeout_secs = 60
//!
//! [insights]
//! window_days = 7
//!
//! [proposal]
//! timeout_secs = 120
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregator::SeverityGapPredicate;
use crate::debate::DebateConfig;
use crate::finding::{GateThresholds, Severity};
use crate::proposal::ProposalConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Insight window settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightsConfig {
    pub window_days: u32,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self { window_days: 7 }
    }
}

/// Disagreement trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisagreementConfig {
    /// Severity levels two reviewers must be apart to debate.
    pub min_gap: u8,
}

impl Default for DisagreementConfig {
    fn default() -> Self {
        Self {
            min_gap: SeverityGapPredicate::default().min_gap,
        }
    }
}

impl DisagreementConfig {
    pub fn predicate(&self) -> SeverityGapPredicate {
        SeverityGapPredicate {
            min_gap: self.min_gap,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub gate: GateThresholds,
    pub disagreement: DisagreementConfig,
    pub debate: DebateConfig,
    pub insights: InsightsConfig,
    pub proposal: ProposalConfig,
}

impl ReviewConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ReviewConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gate
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let max_gap = Severity::Nit.gap(Severity::Blocker);
        if self.disagreement.min_gap == 0 || self.disagreement.min_gap > max_gap {
            return Err(ConfigError::Invalid(format!(
                "disagreement.min_gap must be between 1 and {}, got {}",
                max_gap, self.disagreement.min_gap
            )));
        }
        if self.debate.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "debate.call_timeout_secs must be positive".into(),
            ));
        }
        if self.insights.window_days == 0 {
            return Err(ConfigError::Invalid(
                "insights.window_days must be positive".into(),
            ));
        }
        if self.proposal.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "proposal.timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
