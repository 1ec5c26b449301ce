//! Pipeline error kinds.
//!
//! Stage functions return [`anyhow::Result`] and raise one of these at the
//! root of the chain, so callers can tell the failure classes apart with
//! `err.downcast_ref::<RagError>()` while still getting context messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// The source path or URI could not be opened or fetched.
    #[error("source unreachable: {source_ref}: {reason}")]
    UnreachableSource { source_ref: String, reason: String },

    /// The converter could not turn the fetched bytes into text.
    #[error("conversion failed for {source_ref}: {reason}")]
    Conversion { source_ref: String, reason: String },

    /// A vector's length differs from the dimension fixed for the index.
    #[error("embedding dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        context: String,
    },

    /// The embedding provider failed or returned a malformed response.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// The vector store holds no entries.
    #[error("index is empty: {0}")]
    EmptyIndex(String),

    /// The generative model call failed, timed out, or returned garbage.
    #[error("generation failed: {0}")]
    Generation(String),
}

impl RagError {
    pub fn unreachable(source_ref: impl Into<String>, reason: impl ToString) -> Self {
        RagError::UnreachableSource {
            source_ref: source_ref.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conversion(source_ref: impl Into<String>, reason: impl ToString) -> Self {
        RagError::Conversion {
            source_ref: source_ref.into(),
            reason: reason.to_string(),
        }
    }
}

/// Returns the [`RagError`] at the root of an `anyhow` chain, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&RagError> {
    err.chain().find_map(|e| e.downcast_ref::<RagError>())
}
