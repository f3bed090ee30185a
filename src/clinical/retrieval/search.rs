//! Canonical text builders for similarity search.

use crate::clinical::core::case_record::CaseRecord;
use crate::clinical::core::subject::Subject;

/// Text returned when retrieval has nothing to rank.
pub const NO_SIMILAR_CASES: &str = "No similar prescriptions found.";

/// Text returned when a history listing is empty.
pub const NO_HISTORY: &str = "No history available.";

fn canonical_text(age: u32, diagnosis: &str, history: &[String], symptoms: &str) -> String {
    format!("{age} {diagnosis} {} {symptoms}", history.join(" "))
}

/// Build the query text from the current subject and new symptoms.
#[must_use]
pub fn build_query_text(subject: &Subject, symptoms: &str) -> String {
    canonical_text(subject.age, &subject.diagnosis, &subject.history, symptoms)
}

/// Build the candidate text from a case record's stored snapshot.
#[must_use]
pub fn build_candidate_text(record: &CaseRecord) -> String {
    let mut text = canonical_text(
        record.age,
        &record.diagnosis,
        &record.history,
        &record.symptoms,
    );
    text.push(' ');
    text.push_str(&record.prescription);
    text
}

/// One line of the similar-cases block.
#[must_use]
pub fn format_similar_case(record: &CaseRecord) -> String {
    format!(
        "Patient: {} | Symptoms: {} | Prescription: {}",
        record.subject_id, record.symptoms, record.prescription
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{case_for, subject_p1};

    #[test]
    fn test_query_text_field_order() {
        assert_eq!(build_query_text(&subject_p1(), "cough"), "34 flu asthma cough");
    }

    #[test]
    fn test_candidate_text_appends_prescription() {
        let record = case_for(&subject_p1(), "fever", "paracetamol", 0);
        assert_eq!(
            build_candidate_text(&record),
            "34 flu asthma fever paracetamol"
        );
    }

    #[test]
    fn test_empty_history_keeps_separators() {
        let mut subject = subject_p1();
        subject.history.clear();
        assert_eq!(build_query_text(&subject, "cough"), "34 flu  cough");
    }

    #[test]
    fn test_format_line() {
        let record = case_for(&subject_p1(), "fever", "paracetamol", 0);
        assert_eq!(
            format_similar_case(&record),
            "Patient: p1 | Symptoms: fever | Prescription: paracetamol"
        );
    }
}
