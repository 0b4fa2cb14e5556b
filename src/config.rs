//! TOML configuration.
//!
//! Every section is optional; a missing file yields [`Config::default`].
//!
//! ```toml
//! [staging]
//! dir = "./data"
//!
//! [sources]
//! sftp_port = 22
//! git_default_branch = "main"
//! s3_region = "us-east-1"
//! # s3_endpoint_url = "http://localhost:9000"   # MinIO
//!
//! [llm]
//! model = "capable-tier"
//! temperature = 0.0
//! chat_mode = "condense_question"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::chat::ChatMode;
use crate::models::{ModelConfig, ModelTier};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StagingConfig {
    #[serde(default = "default_staging_dir")]
    pub dir: PathBuf,
    /// Where throwaway clones are created. Defaults to the system temp dir.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: default_staging_dir(),
            work_dir: None,
        }
    }
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    #[serde(default = "default_sftp_port")]
    pub sftp_port: u16,
    #[serde(default = "default_git_branch")]
    pub git_default_branch: String,
    #[serde(default = "default_s3_region")]
    pub s3_region: String,
    #[serde(default)]
    pub s3_endpoint_url: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            sftp_port: default_sftp_port(),
            git_default_branch: default_git_branch(),
            s3_region: default_s3_region(),
            s3_endpoint_url: None,
        }
    }
}

fn default_sftp_port() -> u16 {
    22
}
fn default_git_branch() -> String {
    "main".to_string()
}
fn default_s3_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            recursive: true,
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.md", "**/*.txt", "**/*.pdf", "**/*.docx", "**/*.rst", "**/*.html", "**/*.json",
        "**/*.yaml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub model: ModelTier,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub chat_mode: ChatMode,
    #[serde(default = "default_true")]
    pub verbose: bool,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: ModelTier::default(),
            temperature: 0.0,
            system_prompt: String::new(),
            chat_mode: ChatMode::default(),
            verbose: true,
            api_base: default_api_base(),
            timeout_secs: default_llm_timeout_secs(),
            greeting: default_greeting(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}
fn default_greeting() -> String {
    "Ask me a question about YOUR docs!".to_string()
}

impl LlmConfig {
    /// The model settings the user can override per load.
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model: self.model,
            temperature: self.temperature,
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// Load and validate the config file.
///
/// A path that does not exist yields the defaults, so `docchat` runs without
/// any config at all.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.embedding.batch_size < 1 {
        bail!("embedding.batch_size must be >= 1");
    }
    validate_temperature(config.llm.temperature)?;
    if config.sources.git_default_branch.trim().is_empty() {
        bail!("sources.git_default_branch must not be empty");
    }
    Ok(())
}

pub fn validate_temperature(t: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&t) {
        bail!("temperature must be in [0.0, 1.0], got {}", t);
    }
    Ok(())
}
