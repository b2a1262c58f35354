//! MongoDB storage gateway.
//!
//! Three collections back the pipeline:
//!
//! | Collection | Contents | Key |
//! |------------|----------|-----|
//! | `chunks` | embedded cards | `(user_id, project_id, filename)` + `card_id` |
//! | `files` | per-file summaries | `(user_id, project_id, filename)`, upserted |
//! | `jobs` | upload progress records | `job_id` |
//!
//! Chunk inserts run in bounded unordered batches so one bad record does
//! not abort its batch; idempotency on replace is the caller's concern via
//! [`Store::delete_file_data`] first. Index creation tolerates the
//! "already exists with different options" server errors (codes 85/86).

use anyhow::Result;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime};
use mongodb::{Client, Collection, Database, IndexModel};
use serde::{Deserialize, Serialize};

use crate::config::{MongoConfig, VECTOR_DIM};
use crate::error::IngestError;
use crate::models::{Card, FileSummary, Job, JobStatus};

/// A card as persisted in the `chunks` collection.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoredChunk {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: String,
    pub project_id: String,
    pub filename: String,
    pub topic: String,
    pub summary: String,
    pub content: String,
    pub page_span: [u32; 2],
    pub card_id: String,
    pub embedding: Vec<f32>,
    pub created_at: DateTime,
}

/// A chunk shaped for JSON responses: id stringified, timestamp ISO-8601.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub filename: String,
    pub topic: String,
    pub summary: String,
    pub content: String,
    pub page_span: [u32; 2],
    pub card_id: String,
    pub embedding: Vec<f32>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct FileDoc {
    user_id: String,
    project_id: String,
    filename: String,
    summary: String,
    updated_at: DateTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct JobDoc {
    job_id: String,
    total: i64,
    completed: i64,
    status: JobStatus,
    last_error: Option<String>,
    created_at: DateTime,
}

/// Partial job update; only the provided fields are written
/// (last-write-wins on each).
#[derive(Debug, Default)]
pub struct JobUpdate {
    pub completed: Option<usize>,
    pub status: Option<JobStatus>,
    pub last_error: Option<String>,
}

pub struct Store {
    db: Database,
    chunks: Collection<StoredChunk>,
    files: Collection<FileDoc>,
    jobs: Collection<JobDoc>,
    insert_batch_size: usize,
}

impl Store {
    /// Connect to MongoDB and bind the three collections. The client pools
    /// connections internally; create one `Store` per process and share it.
    pub async fn connect(config: &MongoConfig) -> Result<Store> {
        let client = Client::with_uri_str(&config.uri).await?;
        let db = client.database(&config.db);
        Ok(Store {
            chunks: db.collection("chunks"),
            files: db.collection("files"),
            jobs: db.collection("jobs"),
            db,
            insert_batch_size: config.insert_batch_size,
        })
    }

    /// Round-trip to the server; used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    /// Create the composite lookup indexes on `chunks` and `files`.
    /// Non-unique: the same triple owns many chunks, and uniqueness of
    /// summaries is enforced by upsert, not by the index.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let keys = doc! { "user_id": 1, "project_id": 1, "filename": 1 };
        let chunk_index = IndexModel::builder().keys(keys.clone()).build();
        if let Err(e) = self.chunks.create_index(chunk_index).await {
            if !is_index_conflict(&e) {
                return Err(e.into());
            }
        }
        let file_index = IndexModel::builder().keys(keys).build();
        if let Err(e) = self.files.create_index(file_index).await {
            if !is_index_conflict(&e) {
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// Bulk-insert cards in unordered batches of `insert_batch_size`.
    /// Rejects the whole call if any embedding deviates from
    /// [`VECTOR_DIM`]; a wrong-length vector is a pipeline bug upstream,
    /// not data to persist.
    pub async fn store_chunks(&self, cards: &[Card]) -> Result<usize> {
        check_dimensions(cards)?;
        if cards.is_empty() {
            return Ok(0);
        }
        let now = DateTime::now();
        let mut inserted = 0usize;
        for batch in cards.chunks(self.insert_batch_size) {
            let docs: Vec<StoredChunk> = batch.iter().map(|c| to_stored(c, now)).collect();
            let result = self.chunks.insert_many(docs).ordered(false).await?;
            inserted += result.inserted_ids.len();
        }
        Ok(inserted)
    }

    /// Update-or-insert the summary for (user, project, filename).
    pub async fn upsert_file_summary(
        &self,
        user_id: &str,
        project_id: &str,
        filename: &str,
        summary: &str,
    ) -> Result<()> {
        let filter = doc! {
            "user_id": user_id,
            "project_id": project_id,
            "filename": filename,
        };
        let update = doc! {
            "$set": {
                "summary": summary,
                "updated_at": DateTime::now(),
            },
        };
        self.files.update_one(filter, update).upsert(true).await?;
        Ok(())
    }

    /// All file summaries for a (user, project), sorted by filename.
    pub async fn list_files(&self, user_id: &str, project_id: &str) -> Result<Vec<FileSummary>> {
        let filter = doc! { "user_id": user_id, "project_id": project_id };
        let mut cursor = self.files.find(filter).sort(doc! { "filename": 1 }).await?;
        let mut out = Vec::new();
        while let Some(file) = cursor.try_next().await? {
            out.push(FileSummary {
                filename: file.filename,
                summary: file.summary,
            });
        }
        Ok(out)
    }

    /// Up to `limit` chunks for one file, in insertion order.
    pub async fn get_file_chunks(
        &self,
        user_id: &str,
        project_id: &str,
        filename: &str,
        limit: i64,
    ) -> Result<Vec<ChunkRecord>> {
        let filter = doc! {
            "user_id": user_id,
            "project_id": project_id,
            "filename": filename,
        };
        let mut cursor = self.chunks.find(filter).limit(limit).await?;
        let mut out = Vec::new();
        while let Some(chunk) = cursor.try_next().await? {
            out.push(to_record(chunk));
        }
        Ok(out)
    }

    /// Delete every chunk and the summary for the triple. Idempotent:
    /// deleting absent data succeeds.
    pub async fn delete_file_data(
        &self,
        user_id: &str,
        project_id: &str,
        filename: &str,
    ) -> Result<u64> {
        let filter = doc! {
            "user_id": user_id,
            "project_id": project_id,
            "filename": filename,
        };
        let chunks_deleted = self.chunks.delete_many(filter.clone()).await?.deleted_count;
        self.files.delete_many(filter).await?;
        Ok(chunks_deleted)
    }

    pub async fn create_job(&self, job_id: &str, total: usize) -> Result<()> {
        self.jobs
            .insert_one(JobDoc {
                job_id: job_id.to_string(),
                total: total as i64,
                completed: 0,
                status: JobStatus::Processing,
                last_error: None,
                created_at: DateTime::now(),
            })
            .await?;
        Ok(())
    }

    pub async fn update_job(&self, job_id: &str, update: JobUpdate) -> Result<()> {
        let mut set = doc! {};
        if let Some(completed) = update.completed {
            set.insert("completed", completed as i64);
        }
        if let Some(status) = update.status {
            set.insert("status", mongodb::bson::to_bson(&status)?);
        }
        if let Some(last_error) = update.last_error {
            set.insert("last_error", last_error);
        }
        if set.is_empty() {
            return Ok(());
        }
        self.jobs
            .update_one(doc! { "job_id": job_id }, doc! { "$set": set })
            .await?;
        Ok(())
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let found = self.jobs.find_one(doc! { "job_id": job_id }).await?;
        Ok(found.map(|j| Job {
            job_id: j.job_id,
            total: j.total.max(0) as usize,
            completed: j.completed.max(0) as usize,
            status: j.status,
            last_error: j.last_error,
            created_at: iso8601(j.created_at),
        }))
    }
}

fn to_stored(card: &Card, created_at: DateTime) -> StoredChunk {
    StoredChunk {
        id: None,
        user_id: card.user_id.clone(),
        project_id: card.project_id.clone(),
        filename: card.filename.clone(),
        topic: card.topic.clone(),
        summary: card.summary.clone(),
        content: card.content.clone(),
        page_span: card.page_span,
        card_id: card.card_id.clone(),
        embedding: card.embedding.clone(),
        created_at,
    }
}

fn to_record(chunk: StoredChunk) -> ChunkRecord {
    ChunkRecord {
        id: chunk.id.map(|o| o.to_hex()).unwrap_or_default(),
        user_id: chunk.user_id,
        project_id: chunk.project_id,
        filename: chunk.filename,
        topic: chunk.topic,
        summary: chunk.summary,
        content: chunk.content,
        page_span: chunk.page_span,
        card_id: chunk.card_id,
        embedding: chunk.embedding,
        created_at: iso8601(chunk.created_at),
    }
}

fn iso8601(dt: DateTime) -> String {
    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis())
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

/// Every embedding must be exactly [`VECTOR_DIM`] long before anything is
/// written.
fn check_dimensions(cards: &[Card]) -> Result<(), IngestError> {
    for card in cards {
        if card.embedding.len() != VECTOR_DIM {
            return Err(IngestError::validation(format!(
                "chunk {} has embedding length {}, expected {}",
                card.card_id,
                card.embedding.len(),
                VECTOR_DIM
            )));
        }
    }
    Ok(())
}

/// IndexOptionsConflict (85) / IndexKeySpecsConflict (86): the index is
/// already there, possibly created by an older deployment. Treated as
/// success.
fn is_index_conflict(err: &mongodb::error::Error) -> bool {
    matches!(
        &*err.kind,
        mongodb::error::ErrorKind::Command(c) if c.code == 85 || c.code == 86
    )
}
