//! Uniform tool result envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clinical::core::errors::ClinicalResult;

/// One typed block of tool output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    /// Plain text payload.
    Text {
        /// Block text.
        text: String,
    },
}

/// Successful tool call result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

impl CallToolResult {
    /// Envelope holding a single text block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Concatenated text of every block.
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
            })
            .collect()
    }
}

/// What a handler produced before it is wrapped.
#[derive(Clone, Debug)]
pub enum ToolOutput {
    /// Literal text.
    Text(String),
    /// Structured data rendered as canonical JSON.
    Json(Value),
}

impl ToolOutput {
    /// Structured output from any serializable value.
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized.
    pub fn json<T: Serialize>(value: &T) -> ClinicalResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    /// Wrap into the result envelope.
    ///
    /// # Errors
    /// Returns an error if JSON rendering fails.
    pub fn into_result(self) -> ClinicalResult<CallToolResult> {
        let text = match self {
            Self::Text(text) => text,
            Self::Json(value) => canonical_json(value)?,
        };
        Ok(CallToolResult::text(text))
    }
}

/// Pretty JSON with two-space indentation and sorted object keys.
///
/// # Errors
/// Returns an error if rendering fails.
pub fn canonical_json(value: Value) -> ClinicalResult<String> {
    Ok(serde_json::to_string_pretty(&sort_keys(value))?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, child) in entries {
                sorted.insert(key, sort_keys(child));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
