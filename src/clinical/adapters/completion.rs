//! Text completion through Rig and Ollama.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::{CompletionClient, Nothing};
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::clinical::core::config::LlmConfig;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};

/// Boxed future type for completion calls.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque text-completion service.
pub trait CompletionService: Send + Sync {
    /// Complete a prompt into plain text.
    fn complete(&self, prompt: &str) -> CompletionFuture<'_, ClinicalResult<String>>;
}

type OllamaCompletionModel = ollama::CompletionModel<ReqwestClient>;

/// Ollama completion model driven through Rig.
#[derive(Clone)]
pub struct OllamaCompletion {
    model: OllamaCompletionModel,
    temperature: f64,
    max_tokens: Option<u64>,
}

impl OllamaCompletion {
    /// Build a completion client from config.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    pub fn new(config: &LlmConfig) -> ClinicalResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(ClinicalError::from)?;
        Ok(Self {
            model: client.completion_model(config.model.clone()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

impl CompletionService for OllamaCompletion {
    fn complete(&self, prompt: &str) -> CompletionFuture<'_, ClinicalResult<String>> {
        let prompt = prompt.to_string();
        Box::pin(async move {
            let request = self
                .model
                .completion_request(prompt)
                .temperature(self.temperature)
                .max_tokens_opt(self.max_tokens)
                .build();
            let response = self.model.completion(request).await?;
            let text = extract_text(&response.choice);
            debug!(chars = text.len(), "completion received");
            Ok(text)
        })
    }
}

fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
