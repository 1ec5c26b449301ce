//! SQLite-backed [`VectorStore`].
//!
//! Schema:
//!
//! ```sql
//! store_meta(key TEXT PRIMARY KEY, value TEXT)   -- dims, model, created_at
//! entries(seq INTEGER PRIMARY KEY AUTOINCREMENT, id TEXT UNIQUE,
//!         document_id, source, text, metadata_json, embedding BLOB)
//! ```
//!
//! Embeddings are stored as little-endian `f32` BLOBs and searched by
//! brute-force cosine similarity in Rust, scanning in `seq` order.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::RagError;
use crate::models::{ChunkMetadata, RetrievedChunk};

use super::{check_entry_dims, check_query_dims, rank, VectorEntry, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
    path: PathBuf,
}

/// Recorded store metadata plus entry counts, for `docrag stats`.
#[derive(Debug, Clone)]
pub struct StoreSummary {
    pub dims: Option<usize>,
    pub model: Option<String>,
    pub created_at: Option<String>,
    pub entries: usize,
    pub per_source: Vec<(String, i64)>,
}

impl SqliteStore {
    /// Opens the store for writing. With `overwrite`, any existing store at
    /// the location is deleted first.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let path = config.path();
        if config.overwrite {
            db::remove_database(&path)
                .with_context(|| format!("Failed to remove existing store {}", path.display()))?;
            debug!(path = %path.display(), "discarded existing store");
        }
        let pool = db::connect(&path, true).await?;
        let store = Self { pool, path };
        store.migrate().await?;
        Ok(store)
    }

    /// Opens an existing store for querying without changing its schema. A
    /// missing file, or one without the store tables, is an empty index.
    pub async fn open_existing(config: &StoreConfig) -> Result<Self> {
        let path = config.path();
        if !path.exists() {
            return Err(RagError::EmptyIndex(format!("no store at {}", path.display())).into());
        }
        let pool = db::connect(&path, false).await?;
        let store = Self { pool, path };
        if !store.has_schema().await? {
            let location = store.location();
            store.close().await;
            return Err(RagError::EmptyIndex(format!("no docrag tables in {}", location)).into());
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document_id TEXT NOT NULL,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_source ON entries(source)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// True when both store tables exist. Only reads `sqlite_master`.
    async fn has_schema(&self) -> Result<bool> {
        let n: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('store_meta', 'entries')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(n == 2)
    }

    async fn meta(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM store_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO store_meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn summary(&self) -> Result<StoreSummary> {
        let rows = sqlx::query(
            "SELECT source, COUNT(*) AS n FROM entries GROUP BY source ORDER BY source",
        )
        .fetch_all(&self.pool)
        .await?;
        let per_source: Vec<(String, i64)> = rows
            .iter()
            .map(|row| (row.get("source"), row.get("n")))
            .collect();

        Ok(StoreSummary {
            dims: self.dims().await?,
            model: self.meta("model").await?,
            created_at: self.meta("created_at").await?,
            entries: self.count().await?,
            per_source,
        })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn dims(&self) -> Result<Option<usize>> {
        match self.meta("dims").await? {
            Some(raw) => Ok(Some(raw.parse().with_context(|| {
                format!("Corrupt dims value '{}' in {}", raw, self.path.display())
            })?)),
            None => Ok(None),
        }
    }

    async fn ensure_dims(&self, dims: usize, model: &str) -> Result<()> {
        match self.dims().await? {
            Some(recorded) if recorded != dims => Err(RagError::DimensionMismatch {
                expected: recorded,
                actual: dims,
                context: format!("store {}", self.path.display()),
            }
            .into()),
            Some(_) => Ok(()),
            None => {
                self.set_meta("dims", &dims.to_string()).await?;
                self.set_meta("model", model).await?;
                self.set_meta("created_at", &chrono::Utc::now().to_rfc3339())
                    .await?;
                info!(dims, model, path = %self.path.display(), "store dimension recorded");
                Ok(())
            }
        }
    }

    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize> {
        let dims = match (self.dims().await?, entries.first()) {
            (Some(d), _) => d,
            (None, Some(first)) => {
                let d = first.vector.len();
                self.set_meta("dims", &d.to_string()).await?;
                d
            }
            (None, None) => return Ok(0),
        };
        check_entry_dims(entries, dims)?;

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata)?;
            sqlx::query(
                "INSERT INTO entries (id, document_id, source, text, metadata_json, embedding)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&entry.id)
            .bind(&entry.document_id)
            .bind(&entry.metadata.source)
            .bind(&entry.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(entries.len())
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        check_query_dims(query, self.dims().await?)?;

        // Fetch all vectors and compute cosine similarity in Rust
        let rows = sqlx::query(
            "SELECT id, document_id, text, metadata_json, embedding FROM entries ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                .with_context(|| "Corrupt chunk metadata in store")?;
            let blob: Vec<u8> = row.get("embedding");
            candidates.push(VectorEntry {
                id: row.get("id"),
                document_id: row.get("document_id"),
                vector: blob_to_vec(&blob),
                text: row.get("text"),
                metadata,
            });
        }

        Ok(rank(query, candidates, top_k))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
