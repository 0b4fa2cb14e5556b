//! Retrieval-augmented chat engines.
//!
//! Two modes share one engine:
//!
//! | Mode | Retrieval query | Answer prompt |
//! |------|-----------------|---------------|
//! | `condense_question` | prompt rewritten with prior turns into a standalone question | standalone question + context |
//! | `context` | raw prompt | context + prior turns + prompt |
//!
//! The engine keeps its own turn history, separate from the session's
//! conversation log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::index::{ScoredChunk, VectorIndex};
use crate::llm::{CompletionModel, CompletionRequest};
use crate::models::{ChatMessage, ModelConfig, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    CondenseQuestion,
    Context,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::CondenseQuestion => "condense_question",
            ChatMode::Context => "context",
        }
    }
}

impl std::fmt::Display for ChatMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An answer and the chunks it was grounded on.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<ScoredChunk>,
}

/// Answers one prompt at a time, remembering earlier turns.
#[async_trait]
pub trait ChatEngine: Send {
    async fn chat(&mut self, prompt: &str) -> Result<ChatResponse>;
}

/// Knobs for [`RetrievalChat`] beyond the model configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub mode: ChatMode,
    pub top_k: usize,
    pub verbose: bool,
}

/// Chat engine answering from a [`VectorIndex`].
pub struct RetrievalChat {
    index: Arc<VectorIndex>,
    llm: Arc<dyn CompletionModel>,
    model: ModelConfig,
    options: EngineOptions,
    history: Vec<ChatMessage>,
}

impl RetrievalChat {
    pub fn new(
        index: Arc<VectorIndex>,
        llm: Arc<dyn CompletionModel>,
        model: ModelConfig,
        options: EngineOptions,
    ) -> Self {
        Self {
            index,
            llm,
            model,
            options,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    async fn condense(&self, prompt: &str) -> Result<String> {
        if self.history.is_empty() {
            return Ok(prompt.to_string());
        }

        let request = CompletionRequest {
            model: self.model.model.model_name().to_string(),
            temperature: self.model.temperature,
            messages: vec![ChatMessage::user(condense_prompt(&self.history, prompt))],
        };
        let question = self
            .llm
            .complete(&request)
            .await
            .context("failed to condense question")?;
        if question.trim().is_empty() {
            return Ok(prompt.to_string());
        }
        Ok(question)
    }

    fn answer_messages(&self, question: &str, sources: &[ScoredChunk]) -> Vec<ChatMessage> {
        let mut messages = Vec::new();
        if !self.model.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::system(self.model.system_prompt.clone()));
        }
        messages.push(ChatMessage::system(context_prompt(sources)));
        if self.options.mode == ChatMode::Context {
            messages.extend(self.history.iter().cloned());
        }
        messages.push(ChatMessage::user(question));
        messages
    }
}

#[async_trait]
impl ChatEngine for RetrievalChat {
    async fn chat(&mut self, prompt: &str) -> Result<ChatResponse> {
        let question = match self.options.mode {
            ChatMode::CondenseQuestion => self.condense(prompt).await?,
            ChatMode::Context => prompt.to_string(),
        };
        if self.options.verbose && self.options.mode == ChatMode::CondenseQuestion {
            tracing::info!(question = %question, "querying with condensed question");
        }

        let sources = self
            .index
            .retrieve(&question, self.options.top_k)
            .await
            .context("retrieval failed")?;
        if self.options.verbose {
            for s in &sources {
                tracing::info!(
                    path = %s.chunk.document_path,
                    chunk = s.chunk.chunk_index,
                    score = s.score,
                    "retrieved source"
                );
            }
        }

        let request = CompletionRequest {
            model: self.model.model.model_name().to_string(),
            temperature: self.model.temperature,
            messages: self.answer_messages(&question, &sources),
        };
        let response = self.llm.complete(&request).await?;

        self.history.push(ChatMessage::user(prompt));
        self.history.push(ChatMessage::assistant(response.clone()));
        Ok(ChatResponse { response, sources })
    }
}

fn condense_prompt(history: &[ChatMessage], prompt: &str) -> String {
    let transcript: Vec<String> = history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "Human",
                Role::Assistant => "Assistant",
                Role::System => "System",
            };
            format!("{}: {}", speaker, m.content)
        })
        .collect();
    format!(
        "Given a conversation between a Human and an Assistant and a follow-up message \
         from the Human, rewrite the follow-up as a standalone question that carries all \
         relevant context from the conversation.\n\n\
         <Chat History>\n{}\n\n<Follow Up Message>\n{}\n\n<Standalone question>\n",
        transcript.join("\n"),
        prompt
    )
}

fn context_prompt(sources: &[ScoredChunk]) -> String {
    let mut out = String::from(
        "Context information from the user's documents is below.\n---------------------\n",
    );
    for s in sources {
        out.push_str(&format!("[{}]\n{}\n\n", s.chunk.document_path, s.chunk.text));
    }
    out.push_str(
        "---------------------\nAnswer the user's question using the context \
         information and not prior knowledge.",
    );
    out
}
