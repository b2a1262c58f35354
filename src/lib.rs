//! # StudyBuddy Ingest
//!
//! **A document ingestion pipeline for retrieval-augmented services.**
//!
//! Uploaded PDF and DOCX files are parsed into pages, split into
//! semantically coherent chunks, enriched with a topic label and a short
//! summary, embedded through a remote embedding service, and persisted to
//! MongoDB together with a per-file summary. Downstream RAG services
//! query the stored chunks; this crate only writes them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────────────────────┐   ┌──────────┐
//! │  Upload   │──▶│ Pipeline                         │──▶│ MongoDB   │
//! │ (HTTP)    │   │ parse → chunk → embed → persist │   │ 3 colls   │
//! └──────────┘   └───────────────┬─────────────────┘   └──────────┘
//!                                │ progress
//!                          ┌──────────┐
//!                          │   jobs    │◀── status polling
//!                          └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. `POST /upload` decodes the multipart request into an
//!    [`pipeline::UploadRequest`]; validation and renames happen before a
//!    job record exists.
//! 2. The [`pipeline`] orchestrator persists a job and spawns one
//!    background task; the client gets the job id immediately.
//! 3. Each file runs the per-file state machine ([`models::FileState`]):
//!    reconcile, parse ([`extract`]), chunk ([`chunker`]), embed
//!    ([`embedding`]), persist ([`storage`]).
//! 4. Progress lands in the `jobs` collection after every file; clients
//!    poll `GET /upload/status` until the status is terminal.
//!
//! ## Degradation
//!
//! | Dependency down | Behavior |
//! |-----------------|----------|
//! | LLM | deterministic chunker, heuristic topics and summaries |
//! | Embedder | zero vectors of the correct dimension, pipeline continues |
//! | Parser (bad file) | single placeholder page with the diagnostic |
//! | MongoDB | per-file fatal: job goes to `failed` |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | Environment configuration and limits |
//! | [`models`] | Core data types: pages, cards, jobs, per-file state |
//! | [`error`] | Error taxonomy for fatal conditions |
//! | [`storage`] | MongoDB gateway: chunks, file summaries, job records |
//! | [`embedding`] | Batched remote embedding client with zero-vector fallback |
//! | [`llm`] | One-shot chat and JSON completions with key rotation |
//! | [`summarize`] | Cheap summaries and chunk cleaning |
//! | [`extract`] | PDF/DOCX page extraction |
//! | [`chunker`] | LLM-assisted and deterministic chunking, card enrichment |
//! | [`jobs`] | Per-upload progress records |
//! | [`pipeline`] | Orchestrator: validation, scheduling, per-file state machine |
//! | [`server`] | Axum HTTP surface |

pub mod chunker;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod summarize;
