//! Generation service contract: the external LLM used for debate
//! arguments and proposal drafting.
//!
//! The service is treated as slow and unreliable: every call site goes
//! through [`generate_bounded`] or [`generate_cancellable`], and no caller
//! holds a lock across the await.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors from the generation service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    #[error("generation request failed: {0}")]
    RequestFailed(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation cancelled")]
    Cancelled,

    #[error("malformed generation response: {0}")]
    Malformed(String),
}

/// Text returned by the service plus its token usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Generation {
    /// A generation with no usage accounting.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// `generate(systemInstructions, userContent) -> text`.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<Generation, GenerationError>;
}

/// Accumulated token cost. Tracked, never interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationCost {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub calls: u32,
}

impl GenerationCost {
    pub fn record(&mut self, generation: &Generation) {
        self.prompt_tokens += u64::from(generation.prompt_tokens);
        self.completion_tokens += u64::from(generation.completion_tokens);
        self.calls += 1;
    }

    pub fn merge(&mut self, other: &GenerationCost) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.calls += other.calls;
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Call the service with a deadline.
pub async fn generate_bounded(
    service: &dyn GenerationService,
    system: &str,
    user: &str,
    timeout: Duration,
) -> Result<Generation, GenerationError> {
    match tokio::time::timeout(timeout, service.generate(system, user)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    }
}

/// Call the service with a deadline, abandoning the call if `cancel` fires.
pub async fn generate_cancellable(
    service: &dyn GenerationService,
    system: &str,
    user: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Generation, GenerationError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GenerationError::Cancelled),
        result = generate_bounded(service, system, user, timeout) => result,
    }
}
