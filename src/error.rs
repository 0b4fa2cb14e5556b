//! Error types for ingestion and the chat session.
//!
//! Per-source failures are [`FetchError`]s. The ingestion adapter wraps every
//! one of them in an [`IngestionError`] naming the source kind, which is the
//! only error a caller of [`crate::ingest::Ingestor::ingest`] sees.

use thiserror::Error;

use crate::models::SourceKind;

/// A failure while fetching from one source.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Missing or invalid remote credentials.
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// The remote server rejected the login.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Any other failure while listing or transferring.
    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Catch-all failure of one ingestion run.
///
/// Files already written to the staging directory before the failure are
/// left in place.
#[derive(Error, Debug)]
#[error("ingestion from {kind} failed: {cause}")]
pub struct IngestionError {
    pub kind: SourceKind,
    #[source]
    pub cause: FetchError,
}

impl IngestionError {
    pub fn new(kind: SourceKind, cause: FetchError) -> Self {
        Self { kind, cause }
    }
}

/// Failures surfaced by [`crate::session::Session`].
#[derive(Error, Debug)]
pub enum SessionError {
    /// A prompt was submitted before any successful load.
    #[error("no documents loaded yet; load a source before chatting")]
    NotLoaded,

    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// Loading, indexing, or the chat engine failed after ingestion.
    #[error("{0:#}")]
    Load(anyhow::Error),

    #[error("chat failed: {0:#}")]
    Chat(anyhow::Error),
}
