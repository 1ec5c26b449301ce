//! Index builder: embeds chunks and writes them to a vector store.
//!
//! A build runs in two phases. [`embed_chunks`] first embeds [`PROBE_TEXT`]
//! to learn the provider's dimension `D`, then computes every chunk vector
//! batch by batch and checks it against `D`. Only then is the store opened
//! and written, so a failing build neither leaves a partial set of entries
//! behind nor discards the store it was meant to replace.

use anyhow::Result;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::RagError;
use crate::models::Chunk;
use crate::store::{SqliteStore, VectorEntry, VectorStore};

/// Text embedded once per build to discover the vector dimension.
pub const PROBE_TEXT: &str = "docrag dimension probe";

/// A built index and what the build wrote into it.
pub struct IndexHandle<S: VectorStore> {
    pub store: S,
    pub dims: usize,
    pub model: String,
    pub entries_written: usize,
}

/// Validated vectors for a set of chunks, not yet written anywhere.
pub struct EmbeddedChunks {
    pub dims: usize,
    pub model: String,
    pub entries: Vec<VectorEntry>,
}

/// Embeds `chunks` and writes them to the SQLite store described by
/// `store_config`, replacing its contents when `overwrite` is set.
///
/// The existing store is only touched once every vector is in hand.
pub async fn build(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    store_config: &StoreConfig,
    batch_size: usize,
) -> Result<IndexHandle<SqliteStore>> {
    let embedded = embed_chunks(chunks, embedder, batch_size).await?;
    let store = SqliteStore::open(store_config).await?;
    write(embedded, store).await
}

/// Same as [`build`], against any [`VectorStore`].
pub async fn build_into<S: VectorStore>(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    store: S,
    batch_size: usize,
) -> Result<IndexHandle<S>> {
    let embedded = embed_chunks(chunks, embedder, batch_size).await?;
    write(embedded, store).await
}

/// Probes `D`, then embeds every chunk and checks each vector's length.
pub async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    batch_size: usize,
) -> Result<EmbeddedChunks> {
    let dims = probe_dims(embedder).await?;
    let model = embedder.model_name().to_string();

    let mut entries = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            ))
            .into());
        }
        debug!(batch = batch_no, size = batch.len(), "embedded batch");

        for (chunk, vector) in batch.iter().zip(vectors) {
            if vector.len() != dims {
                return Err(RagError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                    context: format!(
                        "chunk {} ({} #{})",
                        chunk.id, chunk.metadata.source, chunk.chunk_index
                    ),
                }
                .into());
            }
            entries.push(VectorEntry {
                id: chunk.id.clone(),
                document_id: chunk.document_id.clone(),
                vector,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            });
        }
    }

    Ok(EmbeddedChunks {
        dims,
        model,
        entries,
    })
}

/// Records `D` on the store (or checks it) and inserts the entries.
pub async fn write<S: VectorStore>(embedded: EmbeddedChunks, store: S) -> Result<IndexHandle<S>> {
    let EmbeddedChunks {
        dims,
        model,
        entries,
    } = embedded;
    store.ensure_dims(dims, &model).await?;

    let entries_written = store.insert(&entries).await?;
    info!(
        entries = entries_written,
        dims,
        model = %model,
        store = %store.location(),
        "index built"
    );

    Ok(IndexHandle {
        store,
        dims,
        model,
        entries_written,
    })
}

/// Embeds [`PROBE_TEXT`] and returns the vector length.
pub async fn probe_dims(embedder: &dyn EmbeddingProvider) -> Result<usize> {
    let vectors = embedder.embed(&[PROBE_TEXT.to_string()]).await?;
    match vectors.as_slice() {
        [v] if !v.is_empty() => Ok(v.len()),
        [_] => Err(RagError::Embedding("probe returned an empty vector".into()).into()),
        other => Err(RagError::Embedding(format!(
            "probe returned {} vectors for 1 text",
            other.len()
        ))
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::error::kind_of;
    use crate::models::ChunkMetadata;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(i: i64, text: &str) -> Chunk {
        Chunk {
            id: format!("c{i}"),
            document_id: "d".into(),
            chunk_index: i,
            text: text.into(),
            hash: String::new(),
            metadata: ChunkMetadata {
                source: "s.md".into(),
                ..Default::default()
            },
        }
    }

    /// Counts calls and returns short vectors for texts containing "bad".
    struct Scripted {
        inner: HashProvider,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = self.inner.embed_text(t);
                    if t.contains("bad") {
                        v.truncate(2);
                    }
                    v
                })
                .collect())
        }
    }

    struct Dropping;

    #[async_trait]
    impl EmbeddingProvider for Dropping {
        fn model_name(&self) -> &str {
            "dropping"
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            // The probe gets its vector; real batches come back one short.
            let n = if texts.len() == 1 { 1 } else { texts.len() - 1 };
            Ok(vec![vec![1.0; 4]; n])
        }
    }

    #[tokio::test]
    async fn probes_once_then_embeds_in_batches() {
        let embedder = Scripted {
            inner: HashProvider::new(16),
            calls: AtomicUsize::new(0),
        };
        let chunks: Vec<Chunk> = (0..5).map(|i| chunk(i, &format!("chunk {i}"))).collect();

        let handle = build_into(&chunks, &embedder, InMemoryStore::new(), 2)
            .await
            .unwrap();
        assert_eq!(handle.dims, 16);
        assert_eq!(handle.entries_written, 5);
        assert_eq!(handle.model, "scripted");
        // 1 probe + ceil(5 / 2) batches
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
        assert_eq!(handle.store.count().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn wrong_length_vector_names_the_chunk() {
        let embedder = Scripted {
            inner: HashProvider::new(16),
            calls: AtomicUsize::new(0),
        };
        let chunks = vec![chunk(0, "fine"), chunk(1, "a bad one")];
        let store = InMemoryStore::new();

        let err = build_into(&chunks, &embedder, store, 8).await.err().unwrap();
        match kind_of(&err) {
            Some(RagError::DimensionMismatch {
                expected,
                actual,
                context,
            }) => {
                assert_eq!((*expected, *actual), (16, 2));
                assert!(context.contains("c1"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn vector_count_mismatch_is_embedding_error() {
        let chunks = vec![chunk(0, "one"), chunk(1, "two"), chunk(2, "three")];
        let err = build_into(&chunks, &Dropping, InMemoryStore::new(), 8)
            .await
            .err()
            .unwrap();
        assert!(matches!(kind_of(&err), Some(RagError::Embedding(_))));
    }

    #[tokio::test]
    async fn existing_dimension_must_match() {
        let store = InMemoryStore::new();
        store.ensure_dims(3, "older-model").await.unwrap();
        let err = build_into(&[chunk(0, "x")], &HashProvider::new(8), store, 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(kind_of(&err), Some(RagError::DimensionMismatch { .. })));
    }

    struct Unreachable;

    #[async_trait]
    impl EmbeddingProvider for Unreachable {
        fn model_name(&self) -> &str {
            "unreachable"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("connection refused".into()).into())
        }
    }

    #[tokio::test]
    async fn failed_overwrite_keeps_previous_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = StoreConfig {
            uri: tmp.path().join("store.sqlite").display().to_string(),
            overwrite: true,
        };
        let chunks = vec![chunk(0, "kept one"), chunk(1, "kept two")];
        let handle = build(&chunks, &HashProvider::new(8), &config, 4).await.unwrap();
        handle.store.close().await;

        let err = build(&[chunk(2, "replacement")], &Unreachable, &config, 4)
            .await
            .err()
            .unwrap();
        assert!(matches!(kind_of(&err), Some(RagError::Embedding(_))));

        let store = SqliteStore::open_existing(&config).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }
}
