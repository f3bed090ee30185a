//! Prescription retrieval subsystem.
//!
//! - `core`: configuration, errors, identifiers, subjects and case records
//! - `embedding`: embedding provider abstraction with Hugging Face and Ollama backends
//! - `storage`: `SQLite` record store for subjects and the append-only case log
//! - `retrieval`: canonical texts, cosine ranking and similar-case retrieval
//! - `prompt`: generation prompt construction
//! - `adapters`: text completion through Rig
//! - `engine`: drafting and saving prescriptions through the tool server

pub mod adapters;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod prompt;
pub mod retrieval;
pub mod storage;

pub use adapters::{CompletionService, OllamaCompletion};
pub use core::{
    CaseRecord, CaseRecordId, ClinicalConfig, ClinicalError, ClinicalResult, DoctorId, Subject,
    SubjectId,
};
pub use embedding::{Embedder, EmbeddingVector, build_embedder};
pub use engine::{PrescriptionDraft, PrescriptionEngine};
pub use prompt::{PrescriptionPromptParts, build_prescription_prompt};
pub use retrieval::{SimilarCaseRetriever, cosine_similarity, rank};
pub use storage::{CaseFilter, RecordStore, SqliteRecordStore};
