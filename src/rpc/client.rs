//! Client side of the tool server channel.

use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clinical::core::config::ToolServerConfig;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::rpc::error_code::from_wire;
use crate::rpc::protocol::{
    CallToolParams, InitializeResult, JsonRpcRequest, JsonRpcResponse, ListToolsResult,
    PROTOCOL_VERSION, RequestId, methods,
};
use crate::tools::envelope::CallToolResult;
use crate::tools::registry::ToolDescriptor;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Transport {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Typed client for the tool server.
///
/// One request is in flight at a time.
pub struct ToolClient {
    transport: Mutex<Transport>,
    child: Mutex<Option<Child>>,
    next_id: AtomicI64,
}

impl ToolClient {
    /// Spawn the tool server process and perform the handshake.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started or the handshake fails.
    pub async fn spawn(config: &ToolServerConfig) -> ClinicalResult<Self> {
        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClinicalError::Protocol("tool server stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClinicalError::Protocol("tool server stdout unavailable".to_string()))?;

        let client = Self::with_parts(
            Box::new(BufReader::new(stdout)),
            Box::new(stdin),
            Some(child),
        );
        let init = client.initialize().await?;
        info!(
            command = %config.command,
            server = %init.server_info.name,
            version = %init.server_info.version,
            "connected to tool server"
        );
        Ok(client)
    }

    /// Client over an existing byte channel. No handshake is performed.
    pub fn from_transport<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_parts(Box::new(BufReader::new(reader)), Box::new(writer), None)
    }

    fn with_parts(
        reader: Box<dyn AsyncBufRead + Send + Unpin>,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        child: Option<Child>,
    ) -> Self {
        Self {
            transport: Mutex::new(Transport { reader, writer }),
            child: Mutex::new(child),
            next_id: AtomicI64::new(1),
        }
    }

    /// Perform the `initialize` handshake.
    ///
    /// # Errors
    /// Returns an error if the server rejects the handshake.
    pub async fn initialize(&self) -> ClinicalResult<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "prescription-server", "version": env!("CARGO_PKG_VERSION") },
        });
        let result = self.request(methods::INITIALIZE, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Liveness probe.
    ///
    /// # Errors
    /// Returns an error if the channel is broken.
    pub async fn ping(&self) -> ClinicalResult<()> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// List the server's tools.
    ///
    /// # Errors
    /// Returns an error if the channel is broken or the reply is malformed.
    pub async fn list_tools(&self) -> ClinicalResult<Vec<ToolDescriptor>> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let listing: ListToolsResult = serde_json::from_value(result)?;
        Ok(listing.tools)
    }

    /// Invoke a tool.
    ///
    /// # Errors
    /// Returns the tool's typed failure, or a protocol error if the channel breaks.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClinicalResult<CallToolResult> {
        let params = serde_json::to_value(CallToolParams {
            name: name.to_string(),
            arguments,
        })?;
        let result = self.request(methods::TOOLS_CALL, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Invoke a tool and return its text.
    ///
    /// # Errors
    /// Same as [`ToolClient::call_tool`].
    pub async fn call_tool_text(&self, name: &str, arguments: Value) -> ClinicalResult<String> {
        Ok(self.call_tool(name, arguments).await?.joined_text())
    }

    /// Invoke a tool whose text is a JSON document and decode it.
    ///
    /// # Errors
    /// Same as [`ToolClient::call_tool`], plus a serialization error if the
    /// text is not the expected JSON.
    pub async fn call_tool_json<T: DeserializeOwned>(
        &self,
        name: &str,
        arguments: Value,
    ) -> ClinicalResult<T> {
        let text = self.call_tool_text(name, arguments).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Close the channel and wait for the server process to exit.
    ///
    /// # Errors
    /// Returns an error if closing the channel or reaping the process fails.
    pub async fn shutdown(&self) -> ClinicalResult<()> {
        self.transport.lock().await.writer.shutdown().await?;
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(status) => info!("tool server exited with {}", status?),
            Err(_) => {
                warn!("tool server did not exit in time, killing it");
                child.kill().await?;
            }
        }
        Ok(())
    }

    async fn request(&self, method: &str, params: Option<Value>) -> ClinicalResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(RequestId::Integer(id), method, params);
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let mut transport = self.transport.lock().await;
        debug!(id, method, "-> request");
        transport.writer.write_all(line.as_bytes()).await?;
        transport.writer.flush().await?;

        let expected = Some(RequestId::Integer(id));
        loop {
            let mut buf = String::new();
            if transport.reader.read_line(&mut buf).await? == 0 {
                return Err(ClinicalError::Protocol(
                    "tool server closed the channel".to_string(),
                ));
            }
            if buf.trim().is_empty() {
                continue;
            }
            let response: JsonRpcResponse = match serde_json::from_str(&buf) {
                Ok(response) => response,
                Err(err) => {
                    warn!("skipping unreadable line from tool server: {err}");
                    continue;
                }
            };
            if response.id != expected {
                warn!(expected = id, got = ?response.id, "skipping response with unexpected id");
                continue;
            }
            if let Some(error) = response.error {
                return Err(from_wire(&error));
            }
            return Ok(response.result.unwrap_or(Value::Null));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinical::core::subject::Subject;
    use crate::testing::in_process_client;
    use crate::tools::prescription_tools::{GET_PATIENT_BY_ID, GET_SIMILAR_PRESCRIPTIONS};

    #[tokio::test]
    async fn test_list_and_call() {
        let client = in_process_client(&[("cough", "honey")]).await;
        assert_eq!(client.list_tools().await.unwrap().len(), 10);
        client.ping().await.unwrap();

        let subject: Subject = client
            .call_tool_json(GET_PATIENT_BY_ID, json!({"patient_id": "p1"}))
            .await
            .unwrap();
        assert_eq!(subject.age, 34);

        let text = client
            .call_tool_text(
                GET_SIMILAR_PRESCRIPTIONS,
                json!({"patient_id": "p1", "symptoms": "cough"}),
            )
            .await
            .unwrap();
        assert_eq!(text, "Patient: p1 | Symptoms: cough | Prescription: honey");
    }

    #[tokio::test]
    async fn test_typed_errors_cross_the_boundary() {
        let client = in_process_client(&[]).await;
        let err = client
            .call_tool(GET_PATIENT_BY_ID, json!({"patient_id": "p404"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(id) if id == "p404"));

        let err = client
            .call_tool(GET_PATIENT_BY_ID, json!({"patient_id": "p1", "extra": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::InvalidArguments { field, .. } if field == "extra"));

        let err = client.call_tool("nope", Value::Null).await.unwrap_err();
        assert!(matches!(err, ClinicalError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_serialized() {
        let client = in_process_client(&[]).await;
        let (a, b) = tokio::join!(
            client.call_tool_text(GET_PATIENT_BY_ID, json!({"patient_id": "p1"})),
            client.call_tool_text(GET_PATIENT_BY_ID, json!({"patient_id": "p1"})),
        );
        assert_eq!(a.unwrap(), b.unwrap());
    }

    #[tokio::test]
    async fn test_closed_channel_is_protocol_error() {
        let client = in_process_client(&[]).await;
        client.shutdown().await.unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ClinicalError::Protocol(_) | ClinicalError::Io(_)));
    }
}
