//! Embedding provider modules.

pub mod embedder;
pub mod huggingface;

pub use embedder::{EmbedFuture, Embedder, EmbeddingVector, OllamaEmbedder, build_embedder};
pub use huggingface::HuggingFaceEmbedder;
