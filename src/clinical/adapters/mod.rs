//! Adapters to external model services.

pub mod completion;

pub use completion::{CompletionFuture, CompletionService, OllamaCompletion};
