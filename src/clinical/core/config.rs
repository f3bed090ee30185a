//! Configuration for the prescription tool server and HTTP backend.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::clinical::core::case_record::UNKNOWN_DOCTOR;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};

/// Number of similar cases returned by default.
pub const DEFAULT_TOP_K: usize = 2;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ClinicalConfig {
    /// Record store settings.
    pub storage: StorageConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Similar-case retrieval settings.
    pub retrieval: RetrievalConfig,
    /// Completion model settings.
    pub llm: LlmConfig,
    /// Clinic directory data.
    pub clinic: ClinicConfig,
    /// How the HTTP backend launches the tool server.
    pub tool_server: ToolServerConfig,
    /// HTTP backend settings.
    pub http: HttpConfig,
}

impl ClinicalConfig {
    /// Build a configuration from defaults overlaid with process environment variables.
    ///
    /// # Errors
    /// Returns an error if a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> ClinicalResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults overlaid with values from `lookup`.
    ///
    /// # Errors
    /// Returns an error if a value cannot be parsed or the result is invalid.
    pub fn from_lookup<F>(lookup: F) -> ClinicalResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("PRESCRIPTION_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        if let Some(provider) = lookup("PRESCRIPTION_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider.parse()?;
            if config.embedding.provider == EmbeddingProvider::Ollama {
                config.embedding.model = EmbeddingConfig::DEFAULT_OLLAMA_MODEL.to_string();
            }
        }
        if let Some(model) = lookup("PRESCRIPTION_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }
        if let Some(ndims) = lookup("PRESCRIPTION_EMBEDDING_NDIMS") {
            config.embedding.ndims = parse_var("PRESCRIPTION_EMBEDDING_NDIMS", &ndims)?;
        }
        if let Some(base_url) = lookup("PRESCRIPTION_EMBEDDING_URL") {
            config.embedding.base_url = Some(base_url);
        }
        if let Some(token) = lookup("HF_API_TOKEN") {
            config.embedding.api_token = Some(token);
        }

        if let Some(top_k) = lookup("PRESCRIPTION_TOP_K") {
            config.retrieval.top_k = parse_var("PRESCRIPTION_TOP_K", &top_k)?;
        }
        if let Some(scope) = lookup("PRESCRIPTION_RETRIEVAL_SCOPE") {
            config.retrieval.scope = scope.parse()?;
        }
        if let Some(deadline) = lookup("PRESCRIPTION_EMBED_DEADLINE_MS") {
            let deadline: u64 = parse_var("PRESCRIPTION_EMBED_DEADLINE_MS", &deadline)?;
            config.retrieval.embedding_deadline_ms = (deadline > 0).then_some(deadline);
        }

        if let Some(model) = lookup("PRESCRIPTION_LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(base_url) = lookup("PRESCRIPTION_LLM_URL") {
            config.llm.base_url = Some(base_url);
        }

        if let Some(doctors) = lookup("PRESCRIPTION_DOCTORS") {
            config.clinic.doctor_names = parse_doctor_directory(&doctors)?;
        }

        if let Some(command) = lookup("PRESCRIPTION_TOOL_SERVER") {
            config.tool_server.command = command;
        }
        if let Some(port) = lookup("PRESCRIPTION_PORT") {
            config.http.port = parse_var("PRESCRIPTION_PORT", &port)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the settings every binary depends on.
    ///
    /// Embedding settings are checked separately by
    /// [`ClinicalConfig::validate_embedding`], since only the tool server embeds.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ClinicalResult<()> {
        if self.storage.subject_table.trim().is_empty() || self.storage.case_table.trim().is_empty()
        {
            return Err(ClinicalError::InvalidConfig(
                "storage table names must not be empty".to_string(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ClinicalError::InvalidConfig(
                "retrieval.top_k must be > 0".to_string(),
            ));
        }

        if self.tool_server.command.trim().is_empty() {
            return Err(ClinicalError::InvalidConfig(
                "tool_server.command must not be empty".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }

    /// Validate the embedding provider settings.
    ///
    /// # Errors
    /// Returns an error if the model or dimensions are unset, the Hugging Face
    /// provider has no token, or the base URL does not parse.
    pub fn validate_embedding(&self) -> ClinicalResult<()> {
        if self.embedding.model.trim().is_empty() {
            return Err(ClinicalError::InvalidConfig(
                "embedding.model must not be empty".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(ClinicalError::InvalidConfig(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.embedding.provider == EmbeddingProvider::HuggingFace
            && self
                .embedding
                .api_token
                .as_deref()
                .is_none_or(|token| token.trim().is_empty())
        {
            return Err(ClinicalError::InvalidConfig(
                "embedding.api_token is required for the hugging_face provider".to_string(),
            ));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }
}

/// Parse `id=Display Name` pairs separated by `;`.
fn parse_doctor_directory(raw: &str) -> ClinicalResult<BTreeMap<String, String>> {
    raw.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (id, name) = entry.split_once('=').ok_or_else(|| {
                ClinicalError::InvalidConfig(format!(
                    "PRESCRIPTION_DOCTORS entry `{entry}` must look like id=Name"
                ))
            })?;
            let (id, name) = (id.trim(), name.trim());
            if id.is_empty() || name.is_empty() {
                return Err(ClinicalError::InvalidConfig(format!(
                    "PRESCRIPTION_DOCTORS entry `{entry}` has an empty id or name"
                )));
            }
            Ok((id.to_string(), name.to_string()))
        })
        .collect()
}

fn parse_var<T: FromStr>(key: &str, raw: &str) -> ClinicalResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ClinicalError::InvalidConfig(format!("{key} has an invalid value: {raw}")))
}

/// Storage configuration for patient and prescription data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Patient table name.
    pub subject_table: String,
    /// Prescription log table name.
    pub case_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("prescriptions.sqlite"),
            subject_table: "patients".to_string(),
            case_table: "prescription_logs".to_string(),
        }
    }
}

/// Embedding backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Hugging Face inference feature-extraction endpoint.
    HuggingFace,
    /// Local or remote Ollama through Rig.
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ClinicalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hugging_face" | "huggingface" | "hf" => Ok(Self::HuggingFace),
            "ollama" => Ok(Self::Ollama),
            other => Err(ClinicalError::InvalidConfig(format!(
                "unknown embedding provider: {other}"
            ))),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Which backend computes embeddings.
    pub provider: EmbeddingProvider,
    /// Model name understood by the provider.
    pub model: String,
    /// Embedding vector dimensions (used by the Ollama client).
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Bearer token for the Hugging Face provider.
    #[serde(default, skip_serializing)]
    pub api_token: Option<String>,
    /// Optional per-request HTTP timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl EmbeddingConfig {
    /// Default Hugging Face sentence embedding model.
    pub const DEFAULT_HF_MODEL: &'static str = "sentence-transformers/all-MiniLM-L6-v2";
    /// Default Ollama embedding model.
    pub const DEFAULT_OLLAMA_MODEL: &'static str = "nomic-embed-text";
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::HuggingFace,
            model: Self::DEFAULT_HF_MODEL.to_string(),
            ndims: 384,
            base_url: None,
            api_token: None,
            request_timeout_secs: None,
        }
    }
}

/// Which stored cases are candidates for similarity ranking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalScope {
    /// Every case record in the store, whoever it belongs to.
    #[default]
    AllSubjects,
    /// Only the queried subject's own case records.
    SameSubject,
}

impl FromStr for RetrievalScope {
    type Err = ClinicalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_subjects" | "all" => Ok(Self::AllSubjects),
            "same_subject" | "subject" => Ok(Self::SameSubject),
            other => Err(ClinicalError::InvalidConfig(format!(
                "unknown retrieval scope: {other}"
            ))),
        }
    }
}

/// Retrieval settings for similar prescriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of similar cases to return.
    pub top_k: usize,
    /// Candidate filter.
    pub scope: RetrievalScope,
    /// Upper bound for the whole embedding fan-out, in milliseconds.
    pub embedding_deadline_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            scope: RetrievalScope::AllSubjects,
            embedding_deadline_ms: Some(30_000),
        }
    }
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional max tokens.
    pub max_tokens: Option<u64>,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.4,
            max_tokens: Some(512),
            base_url: None,
        }
    }
}

/// Clinic directory data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClinicConfig {
    /// Display names by doctor id.
    pub doctor_names: BTreeMap<String, String>,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        let doctor_names = [
            ("doctor1", "Dr. Smith - Cardiologist"),
            ("doctor2", "Dr. Johnson - General Physician"),
        ]
        .into_iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect();
        Self { doctor_names }
    }
}

impl ClinicConfig {
    /// Resolve a doctor display name, falling back to [`UNKNOWN_DOCTOR`].
    #[must_use]
    pub fn doctor_name(&self, doctor_id: &str) -> String {
        self.doctor_names
            .get(doctor_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_DOCTOR.to_string())
    }
}

/// Child process command for the tool server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: "prescription-mcp".to_string(),
            args: Vec::new(),
        }
    }
}

/// HTTP backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listening port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}
