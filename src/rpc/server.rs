//! Stdio tool server loop.

use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::clinical::core::errors::ClinicalResult;
use crate::rpc::error_code::{
    INTERNAL_ERROR_CODE, INVALID_PARAMS_ERROR_CODE, INVALID_REQUEST_ERROR_CODE,
    METHOD_NOT_FOUND_ERROR_CODE, PARSE_ERROR_CODE, protocol_error, to_wire,
};
use crate::rpc::protocol::{
    CallToolParams, InitializeResult, JSONRPC_VERSION, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, RequestId, SERVER_NAME, ServerInfo,
    methods,
};
use crate::tools::registry::ToolRegistry;

/// Dispatches decoded messages to the tool registry.
pub struct MessageProcessor {
    registry: ToolRegistry,
    initialized: bool,
}

impl MessageProcessor {
    /// Create a processor over a populated registry.
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry,
            initialized: false,
        }
    }

    /// Handle one line of input.
    ///
    /// Returns `None` for notifications and for messages that are not requests.
    pub async fn process_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to parse message: {err}");
                return Some(JsonRpcResponse::failure(
                    None,
                    protocol_error(PARSE_ERROR_CODE, format!("parse error: {err}")),
                ));
            }
        };

        if value.get("method").is_none() {
            debug!("<- ignoring message without method: {value}");
            return None;
        }

        let id_hint = value
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value::<RequestId>(id).ok());
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(err) => {
                return Some(JsonRpcResponse::failure(
                    id_hint,
                    protocol_error(INVALID_REQUEST_ERROR_CODE, format!("invalid request: {err}")),
                ));
            }
        };
        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.map(|id| {
                JsonRpcResponse::failure(
                    Some(id),
                    protocol_error(INVALID_REQUEST_ERROR_CODE, "jsonrpc must be \"2.0\""),
                )
            });
        }

        let Some(id) = request.id else {
            debug!("<- notification {}", request.method);
            return None;
        };

        let outcome = self.process_request(&request.method, request.params).await;
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(Some(id), error),
        })
    }

    async fn process_request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, JsonRpcError> {
        match method {
            methods::INITIALIZE => self.handle_initialize(params.as_ref()),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => self.handle_list_tools(),
            methods::TOOLS_CALL => self.handle_call_tool(params).await,
            other => Err(protocol_error(
                METHOD_NOT_FOUND_ERROR_CODE,
                format!("method not found: {other}"),
            )),
        }
    }

    fn handle_initialize(&mut self, params: Option<&Value>) -> Result<Value, JsonRpcError> {
        info!("initialize -> params: {:?}", params);
        if self.initialized {
            return Err(protocol_error(
                INVALID_REQUEST_ERROR_CODE,
                "initialize called more than once",
            ));
        }
        self.initialized = true;

        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();
        let result = InitializeResult {
            protocol_version,
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        encode(&result)
    }

    fn handle_list_tools(&self) -> Result<Value, JsonRpcError> {
        let result = ListToolsResult {
            tools: self
                .registry
                .list_tools()
                .map(|definition| definition.descriptor())
                .collect(),
        };
        encode(&result)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| {
            protocol_error(INVALID_PARAMS_ERROR_CODE, "tools/call requires params")
        })?;
        let CallToolParams { name, arguments } = serde_json::from_value(params).map_err(|err| {
            protocol_error(INVALID_PARAMS_ERROR_CODE, format!("invalid tools/call params: {err}"))
        })?;

        info!("tools/call -> {name}");
        match self.registry.call_tool(&name, &arguments).await {
            Ok(result) => encode(&result),
            Err(err) => {
                warn!(tool = %name, error = %err, "tool call failed");
                Err(to_wire(&err))
            }
        }
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|err| {
        protocol_error(
            INTERNAL_ERROR_CODE,
            format!("failed to encode result: {err}"),
        )
    })
}

/// Serve requests line by line until the input closes.
///
/// Each request runs to completion before the next line is read.
///
/// # Errors
/// Returns an error if reading or writing the channel fails.
pub async fn serve<R, W>(
    processor: &mut MessageProcessor,
    reader: R,
    mut writer: W,
) -> ClinicalResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = processor.process_line(&line).await {
            let mut encoded = serde_json::to_string(&response)?;
            encoded.push('\n');
            writer.write_all(encoded.as_bytes()).await?;
            writer.flush().await?;
        }
    }
    info!("input closed, tool server stopping");
    Ok(())
}
