//! LLM-backed debate judge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use panel_coordination::debate::{DebateSide, JudgeRequest, JudgeVerdict};
use panel_coordination::{generate_bounded, GenerationService, Judge, JudgeError};

use crate::llm::extract_json_object;
use crate::prompts::JUDGE_PREAMBLE;

/// Parse a judge reply. Range checks and winner validation happen later in
/// [`JudgeVerdict::normalize`].
pub fn parse_verdict(response: &str) -> Result<JudgeVerdict, JudgeError> {
    let json = extract_json_object(response)
        .ok_or_else(|| JudgeError::Malformed("no JSON object in reply".into()))?;
    serde_json::from_str(json).map_err(|e| JudgeError::Malformed(e.to_string()))
}

fn render_side(label: &str, side: &DebateSide) -> String {
    let findings = if side.findings.is_empty() {
        "(no issues raised)".to_string()
    } else {
        side.findings
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "## {}: role `{}`\n\n### Findings\n\n{}\n\n### Argument\n\n{}",
        label, side.role, findings, side.argument
    )
}

/// Render the judge's user message.
pub fn render_request(request: &JudgeRequest) -> String {
    format!(
        "## Prompt under review\n\n{}\n\n{}\n\n{}",
        request.prompt,
        render_side("Side A", &request.side_a),
        render_side("Side B", &request.side_b),
    )
}

pub struct LlmJudge {
    generation: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl LlmJudge {
    pub fn new(generation: Arc<dyn GenerationService>, timeout: Duration) -> Self {
        Self {
            generation,
            timeout,
        }
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<JudgeVerdict, JudgeError> {
        let generation = generate_bounded(
            self.generation.as_ref(),
            JUDGE_PREAMBLE,
            &render_request(request),
            self.timeout,
        )
        .await?;
        let mut verdict = parse_verdict(&generation.text)?;
        verdict.cost.record(&generation);
        Ok(verdict)
    }
}
