//! Pipeline error taxonomy.
//!
//! Helpers degrade instead of failing (empty strings, zero vectors,
//! placeholder pages); the variants here are the conditions that must stop
//! a file or a request. Only the orchestrator converts them into terminal
//! job state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad request data: missing ids, too many files, oversize file,
    /// duplicate rename target, or a chunk with a wrong-length embedding.
    #[error("{0}")]
    Validation(String),

    /// Filename suffix is neither PDF nor DOCX.
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    /// The embedder returned a different number of vectors than chunks.
    /// Positional assignment would be wrong, so the file fails.
    #[error("embedding count {got} does not match chunk count {want}")]
    EmbeddingMismatch { want: usize, got: usize },
}

impl IngestError {
    pub fn validation(msg: impl Into<String>) -> Self {
        IngestError::Validation(msg.into())
    }
}
