use crate::config::LlmConfig;
use crate::models::chat::PromptTurn;
use crate::services::conversation::providers::{Completion, CompletionProvider, GenerationParams};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [PromptTurn],
    pub max_tokens: usize,
    pub temperature: f32,
    pub stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: Option<u32>,
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
}

impl Usage {
    fn total(&self) -> Option<u32> {
        self.total_tokens.or_else(|| match (self.prompt_tokens, self.completion_tokens) {
            (None, None) => None,
            (p, c) => Some(p.unwrap_or(0) + c.unwrap_or(0)),
        })
    }
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
/// One non-streaming request per call, no retries.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    base_url: String,
    model: String,
}

impl LlmService {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }

    /// Generate completion without streaming (wait for full response)
    pub async fn generate_chat(
        &self,
        messages: &[PromptTurn],
        params: GenerationParams,
    ) -> Result<Completion> {
        debug!("Starting chat generation with {} messages", messages.len());

        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error: {} - {}", status, body);
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        into_completion(chat_response)
    }
}

fn into_completion(response: ChatCompletionResponse) -> Result<Completion> {
    let tokens_used = response.usage.as_ref().and_then(Usage::total);

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("No choices returned from LLM")?;

    if text.trim().is_empty() {
        anyhow::bail!("LLM returned an empty message");
    }

    Ok(Completion {
        text,
        tokens_used,
        model: response.model,
    })
}

#[async_trait::async_trait]
impl CompletionProvider for LlmService {
    async fn complete(&self, turns: &[PromptTurn], params: GenerationParams) -> Result<Completion> {
        self.generate_chat(turns, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<Completion> {
        into_completion(serde_json::from_str(raw).unwrap())
    }

    #[test]
    fn test_parses_text_usage_and_model() {
        let c = parse(
            r#"{"model":"llama3","choices":[{"message":{"role":"assistant","content":"Hello!"}}],
                "usage":{"prompt_tokens":10,"completion_tokens":3,"total_tokens":13}}"#,
        )
        .unwrap();
        assert_eq!(c.text, "Hello!");
        assert_eq!(c.tokens_used, Some(13));
        assert_eq!(c.model.as_deref(), Some("llama3"));
    }

    #[test]
    fn test_usage_falls_back_to_sum() {
        let c = parse(
            r#"{"choices":[{"message":{"content":"ok"}}],"usage":{"prompt_tokens":4,"completion_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(c.tokens_used, Some(6));
    }

    #[test]
    fn test_missing_usage_is_none() {
        let c = parse(r#"{"choices":[{"message":{"content":"ok"}}]}"#).unwrap();
        assert_eq!(c.tokens_used, None);
    }

    #[test]
    fn test_no_choices_is_error() {
        assert!(parse(r#"{"choices":[]}"#).is_err());
        assert!(parse(r#"{"choices":[{"message":{"content":"  "}}]}"#).is_err());
    }

    #[test]
    fn test_request_serializes_roles_lowercase() {
        let turns = vec![PromptTurn::system("s"), PromptTurn::user("u")];
        let req = ChatCompletionRequest {
            model: "m",
            messages: &turns,
            max_tokens: 5,
            temperature: 0.7,
            stream: false,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
    }
}
