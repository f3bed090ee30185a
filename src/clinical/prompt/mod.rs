//! Prompt construction modules.

pub mod prompt_builder;

pub use prompt_builder::{PrescriptionPromptParts, build_prescription_prompt};
