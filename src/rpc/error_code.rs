//! JSON-RPC error codes and the typed error mapping.

use serde_json::{Map, Value, json};

use crate::clinical::core::errors::ClinicalError;
use crate::rpc::protocol::JsonRpcError;

/// Line was not valid JSON.
pub const PARSE_ERROR_CODE: i64 = -32700;
/// Message was not a valid request.
pub const INVALID_REQUEST_ERROR_CODE: i64 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND_ERROR_CODE: i64 = -32601;
/// Bad method params or tool arguments.
pub const INVALID_PARAMS_ERROR_CODE: i64 = -32602;
/// Server failed to encode its reply.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Unanticipated handler failure.
pub const TOOL_EXECUTION_ERROR_CODE: i64 = -32000;
/// No tool under that name.
pub const TOOL_NOT_FOUND_ERROR_CODE: i64 = -32001;
/// No subject under that id.
pub const SUBJECT_NOT_FOUND_ERROR_CODE: i64 = -32002;
/// No case record under that id.
pub const CASE_RECORD_NOT_FOUND_ERROR_CODE: i64 = -32003;
/// Embedding provider failed.
pub const EMBEDDING_UNAVAILABLE_ERROR_CODE: i64 = -32004;
/// Record store failed.
pub const STORE_UNAVAILABLE_ERROR_CODE: i64 = -32005;

/// Plain protocol-level error without typed data.
#[must_use]
pub fn protocol_error(code: i64, message: impl Into<String>) -> JsonRpcError {
    JsonRpcError {
        code,
        message: message.into(),
        data: None,
    }
}

/// Encode a tool failure.
///
/// Errors outside the reportable taxonomy are sent as `ToolExecutionError`.
#[must_use]
pub fn to_wire(err: &ClinicalError) -> JsonRpcError {
    let (code, data) = match err {
        ClinicalError::InvalidArguments { field, reason } => (
            INVALID_PARAMS_ERROR_CODE,
            json!({"kind": "InvalidArguments", "field": field, "reason": reason}),
        ),
        ClinicalError::ToolNotFound(name) => (
            TOOL_NOT_FOUND_ERROR_CODE,
            json!({"kind": "ToolNotFound", "name": name}),
        ),
        ClinicalError::SubjectNotFound(id) => (
            SUBJECT_NOT_FOUND_ERROR_CODE,
            json!({"kind": "SubjectNotFound", "id": id}),
        ),
        ClinicalError::CaseRecordNotFound(id) => (
            CASE_RECORD_NOT_FOUND_ERROR_CODE,
            json!({"kind": "CaseRecordNotFound", "id": id}),
        ),
        ClinicalError::EmbeddingUnavailable(detail) => (
            EMBEDDING_UNAVAILABLE_ERROR_CODE,
            json!({"kind": "EmbeddingUnavailable", "detail": detail}),
        ),
        ClinicalError::StoreUnavailable(detail) => (
            STORE_UNAVAILABLE_ERROR_CODE,
            json!({"kind": "StoreUnavailable", "detail": detail}),
        ),
        ClinicalError::ToolExecution(detail) => (
            TOOL_EXECUTION_ERROR_CODE,
            json!({"kind": "ToolExecutionError", "detail": detail}),
        ),
        other => (
            TOOL_EXECUTION_ERROR_CODE,
            json!({"kind": "ToolExecutionError", "detail": other.to_string()}),
        ),
    };
    JsonRpcError {
        code,
        message: err.to_string(),
        data: Some(data),
    }
}

/// Decode a wire error back into the typed error.
#[must_use]
pub fn from_wire(error: &JsonRpcError) -> ClinicalError {
    let empty = Map::new();
    let data = error
        .data
        .as_ref()
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let field = |key: &str| {
        data.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match data.get("kind").and_then(Value::as_str) {
        Some("InvalidArguments") => ClinicalError::InvalidArguments {
            field: field("field"),
            reason: field("reason"),
        },
        Some("ToolNotFound") => ClinicalError::ToolNotFound(field("name")),
        Some("SubjectNotFound") => ClinicalError::SubjectNotFound(field("id")),
        Some("CaseRecordNotFound") => ClinicalError::CaseRecordNotFound(field("id")),
        Some("EmbeddingUnavailable") => ClinicalError::EmbeddingUnavailable(field("detail")),
        Some("StoreUnavailable") => ClinicalError::StoreUnavailable(field("detail")),
        Some("ToolExecutionError") => ClinicalError::ToolExecution(field("detail")),
        _ => ClinicalError::Protocol(format!(
            "server error {}: {}",
            error.code, error.message
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes() {
        let cases = [
            (ClinicalError::invalid_argument("age", "must be a number"), -32602),
            (ClinicalError::ToolNotFound("x".to_string()), -32001),
            (ClinicalError::SubjectNotFound("p1".to_string()), -32002),
            (ClinicalError::CaseRecordNotFound("c1".to_string()), -32003),
            (ClinicalError::EmbeddingUnavailable("down".to_string()), -32004),
            (ClinicalError::StoreUnavailable("locked".to_string()), -32005),
            (ClinicalError::ToolExecution("boom".to_string()), -32000),
        ];
        for (err, code) in cases {
            let wire = to_wire(&err);
            assert_eq!(wire.code, code);
            assert_eq!(from_wire(&wire).to_string(), err.to_string());
        }
    }

    #[test]
    fn test_infrastructure_errors_sent_as_tool_execution() {
        let wire = to_wire(&ClinicalError::InvalidRecord("bad".to_string()));
        assert_eq!(wire.code, TOOL_EXECUTION_ERROR_CODE);
        assert!(matches!(
            from_wire(&wire),
            ClinicalError::ToolExecution(detail) if detail == "invalid record: bad"
        ));
    }

    #[test]
    fn test_untyped_errors_become_protocol() {
        let wire = protocol_error(METHOD_NOT_FOUND_ERROR_CODE, "method not found: nope");
        assert!(matches!(from_wire(&wire), ClinicalError::Protocol(msg) if msg.contains("-32601")));
    }
}
