//! Vector store abstraction.
//!
//! A [`VectorStore`] holds `(id, vector, text, metadata)` entries whose
//! vectors all share one dimension `D`, recorded on first write and enforced
//! on every later write and query. Search is brute-force cosine similarity
//! over all entries, ties broken by insertion order.
//!
//! Two backends:
//! - [`sqlite::SqliteStore`]: the on-disk store used by the CLI.
//! - [`memory::InMemoryStore`]: for tests and library use without a file.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::RagError;
use crate::models::{ChunkMetadata, RetrievedChunk};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// One stored chunk and its embedding.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub document_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Abstract storage backend for embedded chunks.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`dims`](VectorStore::dims) | Recorded dimension, `None` while empty and unset |
/// | [`ensure_dims`](VectorStore::ensure_dims) | Record `D` or check it against the recorded one |
/// | [`insert`](VectorStore::insert) | Append entries |
/// | [`count`](VectorStore::count) | Number of entries |
/// | [`search`](VectorStore::search) | Top-k cosine similarity search |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn dims(&self) -> Result<Option<usize>>;

    /// Records `dims` and `model` if nothing is recorded yet; otherwise fails
    /// with [`RagError::DimensionMismatch`] when `dims` differs.
    async fn ensure_dims(&self, dims: usize, model: &str) -> Result<()>;

    /// Appends entries. Every vector must have the recorded dimension.
    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize>;

    async fn count(&self) -> Result<usize>;

    /// Returns the `top_k` entries most similar to `query`, best first.
    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;

    /// Human-readable location (file path, or `memory`).
    fn location(&self) -> String;
}

/// Fails unless every entry's vector has length `dims`.
pub(crate) fn check_entry_dims(entries: &[VectorEntry], dims: usize) -> Result<()> {
    for entry in entries {
        if entry.vector.len() != dims {
            return Err(RagError::DimensionMismatch {
                expected: dims,
                actual: entry.vector.len(),
                context: format!("entry {}", entry.id),
            }
            .into());
        }
    }
    Ok(())
}

pub(crate) fn check_query_dims(query: &[f32], dims: Option<usize>) -> Result<()> {
    match dims {
        Some(d) if d != query.len() => Err(RagError::DimensionMismatch {
            expected: d,
            actual: query.len(),
            context: "query vector".into(),
        }
        .into()),
        _ => Ok(()),
    }
}

/// Scores candidates given in insertion order and keeps the best `top_k`.
///
/// The sort is stable, so equal scores stay in insertion order.
pub(crate) fn rank<I>(query: &[f32], candidates: I, top_k: usize) -> Vec<RetrievedChunk>
where
    I: IntoIterator<Item = VectorEntry>,
{
    let mut scored: Vec<RetrievedChunk> = candidates
        .into_iter()
        .map(|entry| RetrievedChunk {
            score: cosine_similarity(query, &entry.vector),
            id: entry.id,
            document_id: entry.document_id,
            text: entry.text,
            metadata: entry.metadata,
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    scored
}
