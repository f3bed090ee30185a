//! Hugging Face inference feature-extraction embedder.

use std::time::Duration;

use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::clinical::core::config::EmbeddingConfig;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::embedding::embedder::{EmbedFuture, Embedder, EmbeddingVector, ensure_text};

/// Default inference router base URL.
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference";

/// Longest error body echoed back in an error message.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Embedder calling the Hugging Face feature-extraction pipeline.
#[derive(Clone)]
pub struct HuggingFaceEmbedder {
    client: Client,
    endpoint: String,
    token: String,
    model: String,
}

impl HuggingFaceEmbedder {
    /// Create a new embedder from config.
    ///
    /// # Errors
    /// Returns an error if the token is missing or the HTTP client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> ClinicalResult<Self> {
        let token = config
            .api_token
            .clone()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ClinicalError::InvalidConfig(
                    "embedding.api_token is required for the hugging_face provider".to_string(),
                )
            })?;

        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| ClinicalError::InvalidConfig(format!("http client: {err}")))?;

        let base = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_HF_BASE_URL)
            .trim_end_matches('/');
        let endpoint = format!("{base}/models/{}/pipeline/feature-extraction", config.model);

        Ok(Self {
            client,
            endpoint,
            token,
            model: config.model.clone(),
        })
    }

    async fn request(&self, text: &str) -> ClinicalResult<EmbeddingVector> {
        ensure_text(text)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "inputs": text }))
            .send()
            .await
            .map_err(|err| ClinicalError::EmbeddingUnavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| ClinicalError::EmbeddingUnavailable(err.to_string()))?;

        if !status.is_success() {
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(ClinicalError::EmbeddingUnavailable(format!(
                "provider returned {status}: {snippet}"
            )));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|err| {
            ClinicalError::EmbeddingUnavailable(format!("malformed provider response: {err}"))
        })?;
        let vector = EmbeddingVector::from_json(&payload)?;
        debug!(model = %self.model, dims = vector.len(), "embedded text");
        Ok(vector)
    }
}

impl Embedder for HuggingFaceEmbedder {
    fn embed_text(&self, text: &str) -> EmbedFuture<'_, ClinicalResult<EmbeddingVector>> {
        let text = text.to_string();
        Box::pin(async move { self.request(&text).await })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_uses_model_path() {
        let config = EmbeddingConfig {
            api_token: Some("hf_x".to_string()),
            base_url: Some("https://example.test/hf/".to_string()),
            ..EmbeddingConfig::default()
        };
        let embedder = HuggingFaceEmbedder::new(&config).unwrap();
        assert_eq!(
            embedder.endpoint,
            "https://example.test/hf/models/sentence-transformers/all-MiniLM-L6-v2/pipeline/feature-extraction"
        );
        assert_eq!(embedder.model_name(), EmbeddingConfig::DEFAULT_HF_MODEL);
    }

    #[test]
    fn test_missing_token_rejected() {
        let config = EmbeddingConfig::default();
        assert!(matches!(
            HuggingFaceEmbedder::new(&config),
            Err(ClinicalError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_text_fails_without_request() {
        let config = EmbeddingConfig {
            api_token: Some("hf_x".to_string()),
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..EmbeddingConfig::default()
        };
        let embedder = HuggingFaceEmbedder::new(&config).unwrap();
        let err = embedder.embed_text("").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "embedding unavailable: cannot embed empty text"
        );
    }
}
