//! Core data types flowing through the ingestion pipeline.

use serde::{Deserialize, Serialize};

/// One decoded multipart file, named with its effective (post-rename)
/// filename. Bytes are held until the file finishes processing, then
/// dropped with the value.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A parsed page. Transient: pages exist only between extraction and
/// chunking and are never persisted.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number, monotonically increasing within a file.
    pub number: u32,
    pub text: String,
}

/// A retrieval-ready card: cleaned content plus topic, summary, page span,
/// and a fixed-dimension embedding. This is the unit stored in the chunks
/// collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub user_id: String,
    pub project_id: String,
    pub filename: String,
    pub topic: String,
    pub summary: String,
    pub content: String,
    /// `[first, last]` source pages, 1-based, contiguous within the file.
    pub page_span: [u32; 2],
    /// Deterministic id: `<slug(filename)>-c<NNNN>`, 1-based sequence.
    pub card_id: String,
    pub embedding: Vec<f32>,
}

/// Per-file summary record, unique per (user, project, filename).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub filename: String,
    pub summary: String,
}

/// Terminal and in-flight status of an upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Progress record for one upload request. Created when the upload is
/// accepted, advanced after each file, never mutated once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub total: usize,
    pub completed: usize,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: String,
}

/// Per-file processing state. Each variant carries the payload the next
/// stage consumes, so partial progress is inspectable at any suspension
/// point.
#[derive(Debug)]
pub enum FileState {
    /// Raw bytes accepted, duplicate reconciliation not yet done.
    Received { file: UploadFile },
    /// Pages extracted; original bytes released.
    Parsed { filename: String, pages: Vec<Page> },
    /// Cards built, embeddings still zero-length.
    Chunked {
        filename: String,
        pages: Vec<Page>,
        cards: Vec<Card>,
    },
    /// Embeddings assigned positionally.
    Embedded {
        filename: String,
        pages: Vec<Page>,
        cards: Vec<Card>,
    },
    /// Chunks and summary written; the slot is consumed.
    Persisted,
}

impl FileState {
    /// Stage name used in job logging.
    pub fn stage(&self) -> &'static str {
        match self {
            FileState::Received { .. } => "reconciling",
            FileState::Parsed { .. } => "chunking",
            FileState::Chunked { .. } => "embedding",
            FileState::Embedded { .. } => "persisting",
            FileState::Persisted => "done",
        }
    }
}
