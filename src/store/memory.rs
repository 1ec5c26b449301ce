//! In-memory [`VectorStore`] for tests and library use.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; search is brute-force
//! cosine similarity over all of them.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use crate::error::RagError;
use crate::models::RetrievedChunk;

use super::{check_entry_dims, check_query_dims, rank, VectorEntry, VectorStore};

#[derive(Default)]
struct Inner {
    dims: Option<usize>,
    entries: Vec<VectorEntry>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow::anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn dims(&self) -> Result<Option<usize>> {
        Ok(self.read()?.dims)
    }

    async fn ensure_dims(&self, dims: usize, _model: &str) -> Result<()> {
        let mut inner = self.write()?;
        match inner.dims {
            Some(recorded) if recorded != dims => Err(RagError::DimensionMismatch {
                expected: recorded,
                actual: dims,
                context: "memory store".into(),
            }
            .into()),
            Some(_) => Ok(()),
            None => {
                inner.dims = Some(dims);
                Ok(())
            }
        }
    }

    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut inner = self.write()?;
        let dims = match (inner.dims, entries.first()) {
            (Some(d), _) => d,
            (None, Some(first)) => first.vector.len(),
            (None, None) => return Ok(0),
        };
        check_entry_dims(entries, dims)?;
        inner.dims = Some(dims);
        inner.entries.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.entries.len())
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let inner = self.read()?;
        check_query_dims(query, inner.dims)?;
        Ok(rank(query, inner.entries.iter().cloned(), top_k))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
