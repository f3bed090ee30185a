//! Core prescription types and identifiers.

pub mod case_record;
pub mod config;
pub mod errors;
pub mod ids;
pub mod subject;

pub use case_record::{CaseRecord, UNKNOWN_DOCTOR};
pub use config::{
    ClinicConfig, ClinicalConfig, DEFAULT_TOP_K, EmbeddingConfig, EmbeddingProvider, HttpConfig,
    LlmConfig, RetrievalConfig, RetrievalScope, StorageConfig, ToolServerConfig,
};
pub use errors::{ClinicalError, ClinicalResult};
pub use ids::{CaseRecordId, DoctorId, EmptyIdError, SubjectId};
pub use subject::Subject;
