//! OpenAI-compatible `/chat/completions` client implementing the
//! generation service.

use std::time::Duration;

use async_trait::async_trait;
use panel_coordination::{Generation, GenerationError, GenerationService};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Endpoint;

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Thin HTTP client. Holds no per-request state, so one instance can be
/// shared by every reviewer, the debate runner and the judge.
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: &Endpoint) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: format!("{}/chat/completions", endpoint.url.trim_end_matches('/')),
            model: endpoint.model.clone(),
            api_key: endpoint.api_key.clone(),
            temperature: 0.2,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn parse_response(body: &str) -> Result<Generation, GenerationError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::Malformed(e.to_string()))?;
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GenerationError::Malformed("response has no message content".into()))?;
    let usage = response.usage.unwrap_or_default();
    Ok(Generation {
        text,
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
    })
}

#[async_trait]
impl GenerationService for ChatCompletionsClient {
    async fn generate(&self, system: &str, user: &str) -> Result<Generation, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };

        let mut builder = self
            .http
            .post(&self.url)
            .json(&request)
            .timeout(Duration::from_secs(300));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                GenerationError::Unavailable(e.to_string())
            } else {
                GenerationError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            let snippet: String = body.chars().take(300).collect();
            return Err(GenerationError::RequestFailed(format!(
                "HTTP {}: {}",
                status, snippet
            )));
        }

        let generation = parse_response(&body)?;
        debug!(
            model = %self.model,
            prompt_tokens = generation.prompt_tokens,
            completion_tokens = generation.completion_tokens,
            "Generation complete"
        );
        Ok(generation)
    }
}

/// Pull the first JSON object out of a model reply, tolerating code fences
/// and surrounding prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
