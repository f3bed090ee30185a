//! Error types for the prescription retrieval subsystem.

use thiserror::Error;

/// Prescription subsystem error type.
#[derive(Debug, Error)]
pub enum ClinicalError {
    /// No subject exists under the requested identity.
    #[error("subject not found: {0}")]
    SubjectNotFound(String),
    /// No case record exists under the requested identity.
    #[error("prescription not found: {0}")]
    CaseRecordNotFound(String),
    /// Tool arguments failed schema validation.
    #[error("invalid arguments: `{field}` {reason}")]
    InvalidArguments {
        /// Offending parameter name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// No tool is registered under the requested name.
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    /// A tool with the same name is already registered.
    #[error("tool already registered: {0}")]
    DuplicateTool(String),
    /// The embedding provider failed or returned a malformed vector.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// A tool handler failed with an unanticipated error.
    #[error("tool execution failed: {0}")]
    ToolExecution(String),
    /// The record store could not serve the request.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A stored or submitted record is malformed.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    /// The tool-server channel broke or carried an unexpected message.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
}

impl ClinicalError {
    /// Shorthand for an [`ClinicalError::InvalidArguments`] value.
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error belongs to the taxonomy reported verbatim to tool callers.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::SubjectNotFound(_)
                | Self::CaseRecordNotFound(_)
                | Self::InvalidArguments { .. }
                | Self::ToolNotFound(_)
                | Self::EmbeddingUnavailable(_)
                | Self::ToolExecution(_)
                | Self::StoreUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for ClinicalError {
    fn from(value: rusqlite::Error) -> Self {
        Self::StoreUnavailable(value.to_string())
    }
}

impl From<tokio_rusqlite::Error> for ClinicalError {
    fn from(value: tokio_rusqlite::Error) -> Self {
        Self::StoreUnavailable(value.to_string())
    }
}

/// Convenience result alias for prescription operations.
pub type ClinicalResult<T> = Result<T, ClinicalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_names_field() {
        let err = ClinicalError::invalid_argument("patient_id", "is required");
        assert_eq!(err.to_string(), "invalid arguments: `patient_id` is required");
    }

    #[test]
    fn test_reportable_taxonomy() {
        assert!(ClinicalError::SubjectNotFound("p1".to_string()).is_reportable());
        assert!(ClinicalError::StoreUnavailable("down".to_string()).is_reportable());
        assert!(!ClinicalError::InvalidConfig("x".to_string()).is_reportable());
        assert!(!ClinicalError::Protocol("closed".to_string()).is_reportable());
    }
}
