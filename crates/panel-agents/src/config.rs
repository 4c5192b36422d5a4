use anyhow::{Context, Result};
use panel_coordination::ReviewConfig;
use std::path::PathBuf;

/// OpenAI-compatible inference endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
}

/// Top-level panel configuration.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Endpoint used for LLM reviewers, debate arguments, the judge and
    /// proposal drafting.
    pub endpoint: Endpoint,
    /// Live reviewer definitions (`<role>.md`). Read-only.
    pub reviewers_dir: PathBuf,
    /// Where drafted proposals are written. Must not overlap `reviewers_dir`.
    pub proposals_dir: PathBuf,
    /// Append-only JSONL audit log.
    pub audit_path: PathBuf,
    /// Optional TOML file for [`ReviewConfig`].
    pub review_config_path: Option<PathBuf>,
    /// Per-call timeout for LLM reviewers, in seconds.
    pub reviewer_timeout_secs: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                url: std::env::var("PANEL_LLM_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("PANEL_LLM_MODEL").unwrap_or_else(|_| "default".into()),
                api_key: std::env::var("PANEL_LLM_API_KEY").ok(),
            },
            reviewers_dir: env_path("PANEL_REVIEWERS_DIR", ".panel/reviewers"),
            proposals_dir: env_path("PANEL_PROPOSALS_DIR", ".panel/proposals"),
            audit_path: env_path("PANEL_AUDIT_LOG", ".panel/audit.jsonl"),
            review_config_path: std::env::var("PANEL_CONFIG").ok().map(PathBuf::from),
            reviewer_timeout_secs: std::env::var("PANEL_REVIEWER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(90),
        }
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}

impl PanelConfig {
    /// Load the review config from `review_config_path`, or defaults when
    /// unset.
    pub fn review_config(&self) -> Result<ReviewConfig> {
        match &self.review_config_path {
            Some(path) => ReviewConfig::load(path)
                .with_context(|| format!("Failed to load review config {}", path.display())),
            None => Ok(ReviewConfig::default()),
        }
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(std::time::Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
