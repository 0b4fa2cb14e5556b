//! The chat session.
//!
//! A [`Session`] owns the conversation log, one cached index per load
//! parameter tuple, and the current chat engine. It is driven by two
//! operations:
//!
//! - [`Session::load`] ingests a source, loads and indexes its documents, and
//!   replaces the chat engine. An identical parameter tuple is served from
//!   the cache without touching the source again. A failed load changes
//!   nothing.
//! - [`Session::submit`] sends one prompt to the chat engine and records the
//!   exchange in the log.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chat::{ChatEngine, ChatMode, ChatResponse, EngineOptions, RetrievalChat};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::SessionError;
use crate::index::VectorIndex;
use crate::ingest::Ingestor;
use crate::llm::{CompletionModel, OpenAIChat};
use crate::loader::{DirectoryReader, DocumentLoader};
use crate::models::{ChatMessage, ModelConfig, SourceDescriptor};

/// Everything that determines the outcome of a load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadParams {
    pub source: SourceDescriptor,
    pub model: ModelConfig,
}

impl LoadParams {
    /// Hex SHA-256 of the serialized tuple. Archive bytes enter as their
    /// own digest.
    pub fn cache_key(&self) -> Result<String, SessionError> {
        let encoded = serde_json::to_vec(self).map_err(|e| SessionError::Load(e.into()))?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }
}

/// Result of a successful [`Session::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The index came from the cache; nothing was fetched or embedded.
    pub cached: bool,
    pub chunks: usize,
}

/// Settings a session needs beyond its collaborators.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub greeting: String,
    pub max_tokens: usize,
    pub batch_size: usize,
    pub top_k: usize,
    pub chat_mode: ChatMode,
    pub verbose: bool,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            greeting: config.llm.greeting.clone(),
            max_tokens: config.chunking.max_tokens,
            batch_size: config.embedding.batch_size,
            top_k: config.retrieval.top_k,
            chat_mode: config.llm.chat_mode,
            verbose: config.llm.verbose,
        }
    }
}

pub struct Session {
    ingestor: Ingestor,
    loader: Box<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn CompletionModel>,
    settings: SessionSettings,
    log: Vec<ChatMessage>,
    cache: HashMap<String, Arc<VectorIndex>>,
    engine: Option<Box<dyn ChatEngine>>,
}

impl Session {
    /// A session whose log starts with the greeting.
    pub fn new(
        ingestor: Ingestor,
        loader: Box<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn CompletionModel>,
        settings: SessionSettings,
    ) -> Self {
        let log = vec![ChatMessage::assistant(settings.greeting.clone())];
        Self {
            ingestor,
            loader,
            embedder,
            llm,
            settings,
            log,
            cache: HashMap::new(),
            engine: None,
        }
    }

    /// A session wired to the production loader, embedder, and model.
    ///
    /// Fails when `OPENAI_API_KEY` is not set.
    pub fn from_config(config: &Config, ingestor: Ingestor) -> anyhow::Result<Self> {
        let loader = DirectoryReader::new(&config.loader)?;
        let embedder = OpenAIEmbedder::new(&config.embedding, &config.llm.api_base)?;
        let llm = OpenAIChat::new(&config.llm, config.embedding.max_retries)?;
        Ok(Self::new(
            ingestor,
            Box::new(loader),
            Arc::new(embedder),
            Arc::new(llm),
            SessionSettings::from_config(config),
        ))
    }

    pub fn log(&self) -> &[ChatMessage] {
        &self.log
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Build (or reuse) the index for `params` and start a fresh chat engine
    /// over it.
    pub async fn load(&mut self, params: &LoadParams) -> Result<LoadOutcome, SessionError> {
        let key = params.cache_key()?;

        let (index, cached) = match self.cache.get(&key) {
            Some(index) => {
                tracing::info!(key = %&key[..12], "reusing cached index");
                (Arc::clone(index), true)
            }
            None => (Arc::new(self.build_index(&params.source).await?), false),
        };

        let engine = RetrievalChat::new(
            Arc::clone(&index),
            Arc::clone(&self.llm),
            params.model.clone(),
            EngineOptions {
                mode: self.settings.chat_mode,
                top_k: self.settings.top_k,
                verbose: self.settings.verbose,
            },
        );

        let chunks = index.len();
        if !cached {
            self.cache.insert(key, index);
        }
        self.engine = Some(Box::new(engine));
        Ok(LoadOutcome { cached, chunks })
    }

    async fn build_index(&self, source: &SourceDescriptor) -> Result<VectorIndex, SessionError> {
        let report = self.ingestor.ingest(source).await?;
        let documents = self
            .loader
            .load(&report.staging_dir)
            .map_err(SessionError::Load)?;
        VectorIndex::build(
            &documents,
            Arc::clone(&self.embedder),
            self.settings.max_tokens,
            self.settings.batch_size,
        )
        .await
        .map_err(SessionError::Load)
    }

    /// Send `prompt` to the chat engine.
    ///
    /// Blank prompts are ignored and return `Ok(None)`. Before any
    /// successful load this returns [`SessionError::NotLoaded`] and leaves
    /// the log alone. The log only grows, and only by complete exchanges:
    /// if the engine fails, nothing is appended.
    pub async fn submit(&mut self, prompt: &str) -> Result<Option<ChatResponse>, SessionError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(None);
        }
        let engine = self.engine.as_mut().ok_or(SessionError::NotLoaded)?;

        let reply = engine.chat(prompt).await.map_err(SessionError::Chat)?;
        self.log.push(ChatMessage::user(prompt));
        self.log.push(ChatMessage::assistant(reply.response.clone()));
        Ok(Some(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelTier;

    fn params(bytes: &[u8], temperature: f32) -> LoadParams {
        LoadParams {
            source: SourceDescriptor::Archive {
                bytes: bytes.to_vec(),
            },
            model: ModelConfig {
                model: ModelTier::CapableTier,
                temperature,
                system_prompt: String::new(),
            },
        }
    }

    #[test]
    fn cache_key_tracks_every_field() {
        let base = params(b"zip-1", 0.0).cache_key().unwrap();
        assert_eq!(base, params(b"zip-1", 0.0).cache_key().unwrap());
        assert_ne!(base, params(b"zip-2", 0.0).cache_key().unwrap());
        assert_ne!(base, params(b"zip-1", 0.5).cache_key().unwrap());

        let mut prompted = params(b"zip-1", 0.0);
        prompted.model.system_prompt = "be brief".into();
        assert_ne!(base, prompted.cache_key().unwrap());
    }

    #[test]
    fn cache_key_is_hex_sha256() {
        let key = params(b"zip", 0.0).cache_key().unwrap();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
