//! Embedding provider abstraction and the Rig + Ollama implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::EmbeddingModel;
use rig::providers::ollama;
use serde_json::Value;

use crate::clinical::core::config::{EmbeddingConfig, EmbeddingProvider};
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::embedding::huggingface::HuggingFaceEmbedder;

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Fixed-length numeric representation of a text.
///
/// Always non-empty and free of NaN or infinite components.
#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingVector(Vec<f64>);

impl EmbeddingVector {
    /// Wrap raw components.
    ///
    /// # Errors
    /// Returns [`ClinicalError::EmbeddingUnavailable`] if the vector is empty or
    /// contains non-finite values.
    pub fn new(values: Vec<f64>) -> ClinicalResult<Self> {
        if values.is_empty() {
            return Err(ClinicalError::EmbeddingUnavailable(
                "provider returned an empty vector".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ClinicalError::EmbeddingUnavailable(
                "provider returned non-finite components".to_string(),
            ));
        }
        Ok(Self(values))
    }

    /// Interpret a provider JSON payload as a vector.
    ///
    /// Accepts a flat list of numbers, or a list holding exactly one such list.
    ///
    /// # Errors
    /// Returns [`ClinicalError::EmbeddingUnavailable`] for any other shape,
    /// including error objects.
    pub fn from_json(payload: &Value) -> ClinicalResult<Self> {
        let Value::Array(items) = payload else {
            return Err(ClinicalError::EmbeddingUnavailable(format!(
                "expected a list of numbers, got {}",
                describe(payload)
            )));
        };

        if let [Value::Array(row)] = items.as_slice() {
            return Self::from_numbers(row);
        }
        Self::from_numbers(items)
    }

    fn from_numbers(items: &[Value]) -> ClinicalResult<Self> {
        let values = items
            .iter()
            .map(|item| {
                item.as_f64().ok_or_else(|| {
                    ClinicalError::EmbeddingUnavailable(format!(
                        "expected a number, got {}",
                        describe(item)
                    ))
                })
            })
            .collect::<ClinicalResult<Vec<f64>>>()?;
        Self::new(values)
    }

    /// Borrow the components.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

const fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a nested list",
        Value::Object(_) => "an object",
    }
}

/// Trait abstraction over embedding models.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns [`ClinicalError::EmbeddingUnavailable`] if the request fails or
    /// the provider answers with something other than a vector.
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, ClinicalResult<EmbeddingVector>>;
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Reject blank input before any provider call.
pub(crate) fn ensure_text(text: &str) -> ClinicalResult<()> {
    if text.trim().is_empty() {
        return Err(ClinicalError::EmbeddingUnavailable(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    model_name: String,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> ClinicalResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(ClinicalError::from)?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            model_name: config.model.clone(),
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, ClinicalResult<EmbeddingVector>> {
        let text = text.to_string();
        Box::pin(async move {
            ensure_text(&text)?;
            let embedding = self
                .model
                .embed_text(&text)
                .await
                .map_err(|err| ClinicalError::EmbeddingUnavailable(err.to_string()))?;
            EmbeddingVector::new(embedding.vec)
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Build the configured embedding provider.
///
/// # Errors
/// Returns an error if the provider client cannot be built.
pub fn build_embedder(config: &EmbeddingConfig) -> ClinicalResult<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::HuggingFace => Arc::new(HuggingFaceEmbedder::new(config)?),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    };
    Ok(embedder)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flat_list_is_a_vector() {
        let vector = EmbeddingVector::from_json(&json!([0.5, -1, 2.25])).unwrap();
        assert_eq!(vector.as_slice(), &[0.5, -1.0, 2.25]);
    }

    #[test]
    fn test_single_nested_row_is_unwrapped() {
        let vector = EmbeddingVector::from_json(&json!([[1.0, 2.0]])).unwrap();
        assert_eq!(vector.len(), 2);
    }

    #[test]
    fn test_error_payloads_are_rejected() {
        for payload in [
            json!({"error": "Model is currently loading"}),
            json!([]),
            json!(null),
            json!("oops"),
            json!([[1.0], [2.0]]),
            json!([1.0, "two"]),
        ] {
            let err = EmbeddingVector::from_json(&payload).unwrap_err();
            assert!(
                matches!(err, ClinicalError::EmbeddingUnavailable(_)),
                "payload {payload} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        assert!(EmbeddingVector::new(vec![1.0, f64::NAN]).is_err());
        assert!(EmbeddingVector::new(vec![f64::INFINITY]).is_err());
    }

    #[test]
    fn test_blank_text_rejected() {
        assert!(ensure_text("  ").is_err());
        assert!(ensure_text("34 flu").is_ok());
    }
}
