//! In-memory vector index over document chunks.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::embedding::{cosine_similarity, embed_query, Embedder};
use crate::models::{Chunk, Document};

/// A chunk returned by [`VectorIndex::retrieve`].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks and their embeddings, plus the embedder used to build them so
/// queries land in the same vector space.
pub struct VectorIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("chunks", &self.chunks.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl VectorIndex {
    /// Chunk every document and embed the chunks `batch_size` at a time.
    pub async fn build(
        documents: &[Document],
        embedder: Arc<dyn Embedder>,
        max_tokens: usize,
        batch_size: usize,
    ) -> Result<Self> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| chunk_text(&doc.path, &doc.text, max_tokens))
            .collect();
        if chunks.is_empty() {
            bail!("documents contain no text to index");
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                );
            }
            vectors.extend(embedded);
        }

        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = embedder.model_name(),
            "index built"
        );
        Ok(Self {
            chunks,
            vectors,
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `top_k` chunks most similar to `query`, best first.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(&query_vec, v)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }
}
