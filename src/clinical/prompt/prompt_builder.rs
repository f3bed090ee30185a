//! Prescription generation prompt.

use crate::clinical::core::subject::Subject;
use crate::clinical::retrieval::search::NO_SIMILAR_CASES;

/// Inputs for one generation prompt.
#[derive(Clone, Debug)]
pub struct PrescriptionPromptParts<'a> {
    /// Subject the prescription is for.
    pub subject: &'a Subject,
    /// Presenting symptoms.
    pub symptoms: &'a str,
    /// Ranked similar-cases block from retrieval.
    pub similar_cases: &'a str,
}

/// Build a deterministic generation prompt from prepared parts.
///
/// A blank similar-cases block is replaced with the no-match text.
#[must_use]
pub fn build_prescription_prompt(parts: &PrescriptionPromptParts<'_>) -> String {
    let similar = if parts.similar_cases.trim().is_empty() {
        NO_SIMILAR_CASES
    } else {
        parts.similar_cases
    };

    let mut out = String::with_capacity(512 + parts.similar_cases.len());
    out.push_str(
        "You are a licensed doctor. Based on the following patient details and symptoms, \
         write a professional, short, and safe prescription using only generic medicine names.\n\n",
    );
    out.push_str("Patient Details:\n");
    out.push_str("- Age: ");
    out.push_str(&parts.subject.age.to_string());
    out.push_str("\n- Diagnosis: ");
    out.push_str(&parts.subject.diagnosis);
    out.push_str("\n- History: ");
    out.push_str(&parts.subject.history.join(", "));
    out.push_str("\n\nCurrent Symptoms: ");
    out.push_str(parts.symptoms);
    out.push_str("\n\nRelevant Past Prescriptions:\n");
    out.push_str(similar);
    out.push_str("\n\nStart the prescription directly. Do not include disclaimers or introductions.");
    out
}
