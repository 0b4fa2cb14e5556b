//! # docchat
//!
//! Chat with a set of documents fetched from one of four sources: a zip
//! upload, an S3 bucket, an SFTP server, or a git repository.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌─────────┐   ┌─────────┐   ┌────────┐
//! │ Selector  │──▶│ Ingestor  │──▶│ Loader  │──▶│  Index  │──▶│  Chat  │
//! │ creds+path│   │ zip/s3/   │   │ staging │   │ chunk + │   │ engine │
//! └───────────┘   │ sftp/git  │   │  → docs │   │ embed   │   └────────┘
//!                 └───────────┘   └─────────┘   └─────────┘
//! ```
//!
//! Every source lands as a plain file tree in one staging directory, so
//! everything after the [`ingest::Ingestor`] is source-agnostic. The
//! [`session::Session`] ties the pipeline together and caches one index per
//! load parameter tuple.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Ingestion and session error types |
//! | [`selector`] | Credential collection into a source descriptor |
//! | [`ingest`] | Source-agnostic ingestion adapter |
//! | [`connector_archive`] | Zip upload source |
//! | [`connector_s3`] | Amazon S3 source |
//! | [`connector_sftp`] | SFTP source |
//! | [`connector_git`] | Git repository source |
//! | [`progress`] | Ingestion notices |
//! | [`loader`] | Staging directory → documents |
//! | [`extract`] | PDF and DOCX text extraction |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedder abstraction |
//! | [`index`] | In-memory vector index |
//! | [`openai`] | OpenAI-compatible HTTP client |
//! | [`llm`] | Chat-completion models |
//! | [`chat`] | Retrieval chat engines |
//! | [`session`] | Conversation log, index cache, chat engine handle |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod connector_archive;
pub mod connector_git;
pub mod connector_s3;
pub mod connector_sftp;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod openai;
pub mod progress;
pub mod selector;
pub mod session;
