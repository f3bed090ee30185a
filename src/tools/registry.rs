//! Tool registry and call dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::tools::envelope::{CallToolResult, ToolOutput};
use crate::tools::schema::{ToolArgs, ToolSchema};

/// Boxed future returned by tool handlers.
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = ClinicalResult<ToolOutput>> + Send + 'a>>;

/// Executes one tool with validated arguments.
pub trait ToolHandler: Send + Sync {
    /// Run the tool.
    fn call(&self, args: ToolArgs) -> ToolFuture<'_>;
}

impl<F, Fut> ToolHandler for F
where
    F: Fn(ToolArgs) -> Fut + Send + Sync,
    Fut: Future<Output = ClinicalResult<ToolOutput>> + Send + 'static,
{
    fn call(&self, args: ToolArgs) -> ToolFuture<'_> {
        Box::pin(self(args))
    }
}

/// Name, description and parameter schema of a tool.
#[derive(Clone, Debug)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Short display title.
    pub title: String,
    /// What the tool does.
    pub description: String,
    /// Argument schema.
    pub schema: ToolSchema,
}

impl ToolDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(name: &str, title: &str, description: &str, schema: ToolSchema) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            schema,
        }
    }

    /// Listing entry published to callers.
    #[must_use]
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            title: Some(self.title.clone()),
            description: self.description.clone(),
            input_schema: self.schema.to_json_schema(),
        }
    }
}

/// Tool listing entry as it crosses the process boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Short display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Lifecycle of one call, traced at debug level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallPhase {
    /// Request accepted.
    Received,
    /// Arguments passed the schema.
    Validated,
    /// Handler running.
    Executing,
    /// Handler returned a result.
    Succeeded,
    /// Lookup, validation or handler failed.
    Failed,
}

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Name-keyed set of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its definition name.
    ///
    /// # Errors
    /// Returns [`ClinicalError::DuplicateTool`] if the name is taken; the first
    /// registration stays in effect.
    pub fn register_tool<H>(&mut self, definition: ToolDefinition, handler: H) -> ClinicalResult<()>
    where
        H: ToolHandler + 'static,
    {
        if self.by_name.contains_key(&definition.name) {
            return Err(ClinicalError::DuplicateTool(definition.name));
        }
        self.by_name.insert(definition.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            handler: Arc::new(handler),
        });
        Ok(())
    }

    /// Definitions in registration order.
    pub fn list_tools(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.iter().map(|tool| &tool.definition)
    }

    /// Validate arguments and run the named tool.
    ///
    /// Taxonomy errors from the handler pass through; anything else, panics
    /// included, becomes [`ClinicalError::ToolExecution`].
    ///
    /// # Errors
    /// Returns [`ClinicalError::ToolNotFound`], [`ClinicalError::InvalidArguments`]
    /// or the handler's failure.
    pub async fn call_tool(&self, name: &str, arguments: &Value) -> ClinicalResult<CallToolResult> {
        debug!(tool = name, phase = ?CallPhase::Received, "tool call");
        let result = self.dispatch(name, arguments).await;
        match &result {
            Ok(_) => debug!(tool = name, phase = ?CallPhase::Succeeded, "tool call"),
            Err(err) => debug!(tool = name, phase = ?CallPhase::Failed, error = %err, "tool call"),
        }
        result
    }

    async fn dispatch(&self, name: &str, arguments: &Value) -> ClinicalResult<CallToolResult> {
        let tool = self
            .by_name
            .get(name)
            .and_then(|index| self.tools.get(*index))
            .ok_or_else(|| ClinicalError::ToolNotFound(name.to_string()))?;

        let args = tool.definition.schema.validate(arguments)?;
        debug!(tool = name, phase = ?CallPhase::Validated, "tool call");

        debug!(tool = name, phase = ?CallPhase::Executing, "tool call");
        let handler = Arc::clone(&tool.handler);
        let outcome = AssertUnwindSafe(handler.call(args)).catch_unwind().await;

        match outcome {
            Ok(Ok(output)) => output.into_result(),
            Ok(Err(err)) if err.is_reportable() => Err(err),
            Ok(Err(err)) => Err(ClinicalError::ToolExecution(err.to_string())),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = name, panic = %message, "tool handler panicked");
                Err(ClinicalError::ToolExecution(message))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tools::schema::ParamType;

    fn echo_definition(name: &str) -> ToolDefinition {
        ToolDefinition::new(
            name,
            "Echo",
            "Echo the text argument",
            ToolSchema::new().required("text", ParamType::String, "Text to echo"),
        )
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool(echo_definition("echo"), |args: ToolArgs| async move {
                args.str("text").map(|text| ToolOutput::Text(text.to_string()))
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_call_wraps_output() {
        let result = registry()
            .call_tool("echo", &json!({"text": "hi"}))
            .await
            .unwrap();
        assert_eq!(result, CallToolResult::text("hi"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let err = registry().call_tool("nope", &json!({})).await.unwrap_err();
        assert!(matches!(err, ClinicalError::ToolNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_validation_runs_before_handler() {
        let err = registry()
            .call_tool("echo", &json!({"text": "hi", "extra": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::InvalidArguments { field, .. } if field == "extra"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry
            .register_tool(echo_definition("echo"), |_args: ToolArgs| async move {
                Ok::<_, ClinicalError>(ToolOutput::Text("second".to_string()))
            })
            .unwrap_err();
        assert!(matches!(err, ClinicalError::DuplicateTool(name) if name == "echo"));
        assert_eq!(registry.list_tools().count(), 1);
    }

    #[tokio::test]
    async fn test_taxonomy_errors_pass_through() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolDefinition::new("lookup", "Lookup", "Always missing", ToolSchema::new()),
                |_args: ToolArgs| async move {
                    Err::<ToolOutput, _>(ClinicalError::SubjectNotFound("p9".to_string()))
                },
            )
            .unwrap();
        let err = registry.call_tool("lookup", &Value::Null).await.unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(id) if id == "p9"));
    }

    #[tokio::test]
    async fn test_other_errors_become_tool_execution() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolDefinition::new("broken", "Broken", "Fails oddly", ToolSchema::new()),
                |_args: ToolArgs| async move {
                    Err::<ToolOutput, _>(ClinicalError::InvalidRecord("bad row".to_string()))
                },
            )
            .unwrap();
        let err = registry.call_tool("broken", &Value::Null).await.unwrap_err();
        assert!(matches!(err, ClinicalError::ToolExecution(msg) if msg.contains("bad row")));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let mut registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolDefinition::new("panics", "Panics", "Panics", ToolSchema::new()),
                |_args: ToolArgs| async move {
                    if true {
                        panic!("boom");
                    }
                    Ok::<_, ClinicalError>(ToolOutput::Text(String::new()))
                },
            )
            .unwrap();
        let err = registry.call_tool("panics", &Value::Null).await.unwrap_err();
        assert!(matches!(err, ClinicalError::ToolExecution(msg) if msg == "boom"));

        let still_ok = registry.call_tool("panics", &json!({"x": 1})).await.unwrap_err();
        assert!(matches!(still_ok, ClinicalError::InvalidArguments { .. }));
    }
}
