//! Ingestion orchestration.
//!
//! [`Ingestor::submit_upload`] validates the request, applies renames,
//! persists the job record, and spawns one background task for the whole
//! upload; the job id returns to the caller immediately. The task walks
//! files sequentially through the per-file state machine
//! ([`FileState`]): reconcile (purge on replace) → parse → chunk → embed →
//! persist. Progress lands in the job record after every file, so polling
//! clients observe monotone `completed` and a single terminal transition.
//!
//! Failure policy: the first file that fails consumes its slot, the job
//! goes to `failed` with the stringified error, and remaining files are
//! aborted. Degradations inside a stage (embedder zeros, LLM fallbacks,
//! placeholder pages) are not failures; only storage errors, unsupported
//! types, and embedding count mismatches stop a file.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;

use crate::chunker;
use crate::config::{Config, UploadConfig};
use crate::embedding::EmbeddingClient;
use crate::error::IngestError;
use crate::extract;
use crate::jobs::JobManager;
use crate::llm::LlmClient;
use crate::models::{FileState, JobStatus, UploadFile};
use crate::storage::Store;
use crate::summarize::cheap_summarize;

/// A decoded upload request, post-multipart.
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub user_id: String,
    pub project_id: String,
    pub files: Vec<UploadFile>,
    pub replace_filenames: HashSet<String>,
    pub rename_map: HashMap<String, String>,
}

pub struct Ingestor {
    config: Config,
    store: Arc<Store>,
    jobs: JobManager,
    embedder: EmbeddingClient,
    llm: LlmClient,
}

impl Ingestor {
    pub fn new(config: Config, store: Arc<Store>) -> Result<Ingestor> {
        let embedder = EmbeddingClient::new(&config.embed)?;
        let llm = LlmClient::new(&config.llm)?;
        let jobs = JobManager::new(store.clone());
        Ok(Ingestor {
            config,
            store,
            jobs,
            embedder,
            llm,
        })
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Body limit for the upload route: a full batch of maximum-size files
    /// plus a megabyte of form-field slack.
    pub fn max_upload_body_bytes(&self) -> usize {
        self.config.upload.max_file_bytes() * self.config.upload.max_files + 1024 * 1024
    }

    /// Accept an upload: validate, create the job record, schedule the
    /// background run, return the job id. Fire-and-forget; the caller
    /// polls `get_job_status`.
    pub async fn submit_upload(self: Arc<Self>, mut request: UploadRequest) -> Result<String> {
        apply_renames(&mut request.files, &request.rename_map);
        validate_upload(&self.config.upload, &request)?;

        let job_id = self.jobs.create(request.files.len()).await?;
        tracing::info!(
            job_id = %job_id,
            user_id = %request.user_id,
            files = request.files.len(),
            "upload accepted"
        );

        let ingestor = self.clone();
        tokio::spawn(ingestor.run_job(
            job_id.clone(),
            request.user_id,
            request.project_id,
            request.files,
            request.replace_filenames,
        ));

        Ok(job_id)
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: String,
        user_id: String,
        project_id: String,
        files: Vec<UploadFile>,
        replace: HashSet<String>,
    ) {
        let total = files.len();
        let mut completed = 0usize;
        for file in files {
            let filename = file.filename.clone();
            let is_replace = replace.contains(&filename);
            let result = self
                .process_file(&user_id, &project_id, is_replace, file)
                .await;
            completed += 1;
            match result {
                Ok(()) => {
                    let update = if completed == total {
                        self.jobs
                            .finish(&job_id, JobStatus::Completed, completed, None)
                            .await
                    } else {
                        self.jobs.advance(&job_id, completed).await
                    };
                    if let Err(e) = update {
                        tracing::error!(job_id = %job_id, error = %e, "job update failed");
                        let _ = self
                            .jobs
                            .finish(&job_id, JobStatus::Failed, completed, Some(e.to_string()))
                            .await;
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        filename = %filename,
                        error = %e,
                        "file failed, aborting remaining files"
                    );
                    let _ = self
                        .jobs
                        .finish(&job_id, JobStatus::Failed, completed, Some(e.to_string()))
                        .await;
                    return;
                }
            }
        }
        tracing::info!(job_id = %job_id, total, "job completed");
    }

    /// Drive one file through the state machine. Each arm consumes the
    /// prior stage's payload and produces the next; raw bytes are released
    /// as soon as pages exist.
    async fn process_file(
        &self,
        user_id: &str,
        project_id: &str,
        replace: bool,
        file: UploadFile,
    ) -> Result<()> {
        let mut state = FileState::Received { file };
        loop {
            state = match state {
                FileState::Received { file } => {
                    if replace {
                        let deleted = self
                            .store
                            .delete_file_data(user_id, project_id, &file.filename)
                            .await?;
                        tracing::info!(
                            filename = %file.filename,
                            chunks_deleted = deleted,
                            "purged prior data before re-ingest"
                        );
                    }
                    let pages =
                        extract::extract_pages(&file.filename, &file.bytes, &self.config.parser)?;
                    FileState::Parsed {
                        filename: file.filename,
                        pages,
                    }
                }
                FileState::Parsed { filename, pages } => {
                    let cards = chunker::build_cards(
                        &self.llm,
                        &self.config.chunking,
                        user_id,
                        project_id,
                        &filename,
                        &pages,
                    )
                    .await;
                    tracing::info!(filename = %filename, cards = cards.len(), "chunked");
                    FileState::Chunked {
                        filename,
                        pages,
                        cards,
                    }
                }
                FileState::Chunked {
                    filename,
                    pages,
                    mut cards,
                } => {
                    let texts: Vec<String> = cards.iter().map(|c| c.content.clone()).collect();
                    let vectors = self.embedder.embed(&texts).await;
                    if vectors.len() != cards.len() {
                        return Err(IngestError::EmbeddingMismatch {
                            want: cards.len(),
                            got: vectors.len(),
                        }
                        .into());
                    }
                    for (card, vector) in cards.iter_mut().zip(vectors) {
                        card.embedding = vector;
                    }
                    FileState::Embedded {
                        filename,
                        pages,
                        cards,
                    }
                }
                FileState::Embedded {
                    filename,
                    pages,
                    cards,
                } => {
                    if !cards.is_empty() {
                        let stored = self.store.store_chunks(&cards).await?;
                        tracing::info!(filename = %filename, stored, "chunks persisted");
                    }
                    let full_text = pages
                        .iter()
                        .map(|p| p.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n");
                    let summary = cheap_summarize(&self.llm, &full_text, 6).await;
                    self.store
                        .upsert_file_summary(user_id, project_id, &filename, &summary)
                        .await?;
                    FileState::Persisted
                }
                FileState::Persisted => return Ok(()),
            };
        }
    }
}

/// Replace each filename with its mapped target, when present.
pub fn apply_renames(files: &mut [UploadFile], rename_map: &HashMap<String, String>) {
    for file in files {
        if let Some(target) = rename_map.get(&file.filename) {
            file.filename = target.clone();
        }
    }
}

/// Request validation, run after renames so limits and uniqueness apply to
/// the effective filenames.
pub fn validate_upload(limits: &UploadConfig, request: &UploadRequest) -> Result<(), IngestError> {
    if request.user_id.trim().is_empty() {
        return Err(IngestError::validation("user_id is required"));
    }
    if request.project_id.trim().is_empty() {
        return Err(IngestError::validation("project_id is required"));
    }
    if request.files.is_empty() {
        return Err(IngestError::validation("at least one file is required"));
    }
    if request.files.len() > limits.max_files {
        return Err(IngestError::validation(format!(
            "too many files: {} (limit {})",
            request.files.len(),
            limits.max_files
        )));
    }
    let mut seen = HashSet::new();
    for file in &request.files {
        if file.bytes.is_empty() {
            return Err(IngestError::validation(format!(
                "{} is empty",
                file.filename
            )));
        }
        if file.bytes.len() > limits.max_file_bytes() {
            return Err(IngestError::validation(format!(
                "{} exceeds {} MB limit",
                file.filename, limits.max_file_mb
            )));
        }
        if !seen.insert(file.filename.as_str()) {
            return Err(IngestError::validation(format!(
                "duplicate filename in upload: {}",
                file.filename
            )));
        }
    }
    Ok(())
}
