//! Chat-completion models.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::models::ChatMessage;
use crate::openai::OpenAIClient;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
}

/// Produces the assistant's reply to a list of messages.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// `POST {api_base}/chat/completions`.
pub struct OpenAIChat {
    client: OpenAIClient,
}

impl OpenAIChat {
    /// Requires `OPENAI_API_KEY` in the environment.
    pub fn new(config: &LlmConfig, max_retries: u32) -> Result<Self> {
        Ok(Self {
            client: OpenAIClient::from_env(&config.api_base, config.timeout_secs, max_retries)?,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAIChat {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        let body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
        });

        tracing::debug!(model = %request.model, messages = messages.len(), "chat completion");
        let json = self.client.post_json("chat/completions", &body).await?;
        parse_completion(&json)
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}
