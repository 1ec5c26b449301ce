//! Query engine: retrieve evidence for a question and generate an answer.
//!
//! Steps per call:
//!
//! 1. Fail with [`RagError::EmptyIndex`] if the store has no entries. No
//!    model (embedding or generative) is called in that case.
//! 2. Embed the question with the provider used at build time.
//! 3. Take the `top_k` most similar entries (fewer if the store is smaller).
//! 4. Render the prompt template with the retrieved texts.
//! 5. Generate and return the answer, trimmed, with its sources.

use anyhow::{bail, Result};
use tracing::{debug, info};

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::error::RagError;
use crate::generation::GenerationProvider;
use crate::models::{QueryResult, RetrievedChunk};
use crate::prompt;
use crate::store::VectorStore;

pub struct QueryEngine<'a, S: VectorStore> {
    store: &'a S,
    embedder: &'a dyn EmbeddingProvider,
    generator: &'a dyn GenerationProvider,
    template: Option<String>,
}

impl<'a, S: VectorStore> QueryEngine<'a, S> {
    pub fn new(
        store: &'a S,
        embedder: &'a dyn EmbeddingProvider,
        generator: &'a dyn GenerationProvider,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            template: None,
        }
    }

    /// Uses `template` (with `{context}` and `{question}`) instead of the
    /// default QA prompt.
    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    /// Returns the `top_k` entries most similar to `question`.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if top_k == 0 {
            bail!("top_k must be >= 1");
        }
        if self.store.count().await? == 0 {
            return Err(RagError::EmptyIndex(self.store.location()).into());
        }

        let query_vec = embed_one(self.embedder, question).await?;
        let hits = self.store.search(&query_vec, top_k).await?;
        debug!(hits = hits.len(), top_k, "retrieved");
        Ok(hits)
    }

    pub async fn query(&self, question: &str, top_k: usize) -> Result<QueryResult> {
        let sources = self.retrieve(question, top_k).await?;

        let prompt = prompt::build_prompt(self.template.as_deref(), &sources, question);
        let raw = self.generator.generate(&prompt).await?;
        let answer = raw.trim().to_string();

        info!(
            model = self.generator.model_name(),
            sources = sources.len(),
            answer_chars = answer.len(),
            "answered"
        );
        Ok(QueryResult { answer, sources })
    }
}
