//! Prescription drafting module.

pub mod core;

pub use core::{PrescriptionDraft, PrescriptionEngine};
