//! Append-only prescription log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clinical::core::ids::{CaseRecordId, DoctorId, SubjectId};
use crate::clinical::core::subject::Subject;

/// Doctor name recorded when the directory has no entry for the doctor.
pub const UNKNOWN_DOCTOR: &str = "Unknown Doctor";

/// Snapshot of one clinical encounter.
///
/// Age, diagnosis and history are copied from the subject when the record is
/// created and never follow later edits of the subject.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Record identity.
    pub id: CaseRecordId,
    /// Back-reference to the subject.
    #[serde(rename = "patient_id")]
    pub subject_id: SubjectId,
    /// Subject display name at case time.
    #[serde(rename = "patient_name")]
    pub subject_name: String,
    /// Prescribing doctor.
    pub doctor_id: DoctorId,
    /// Prescribing doctor display name.
    pub doctor_name: String,
    /// Subject age at case time.
    pub age: u32,
    /// Subject diagnosis at case time.
    pub diagnosis: String,
    /// Subject history at case time.
    pub history: Vec<String>,
    /// Presenting symptoms.
    pub symptoms: String,
    /// Generated or edited recommendation text.
    pub prescription: String,
    /// Creation time.
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl CaseRecord {
    /// Snapshot a subject into a new record with a fresh id.
    #[must_use]
    pub fn from_subject(
        subject: &Subject,
        doctor_id: DoctorId,
        doctor_name: impl Into<String>,
        symptoms: impl Into<String>,
        prescription: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CaseRecordId::generate(),
            subject_id: subject.id.clone(),
            subject_name: subject.name.clone(),
            doctor_id,
            doctor_name: doctor_name.into(),
            age: subject.age,
            diagnosis: subject.diagnosis.clone(),
            history: subject.history.clone(),
            symptoms: symptoms.into(),
            prescription: prescription.into(),
            created_at,
        }
    }

    /// One-line summary used by the prescription history tool.
    #[must_use]
    pub fn history_line(&self) -> String {
        format!(
            "Patient: {} | Age: {} | Diagnosis: {} | History: {} | Symptoms: {} | Prescription: {}",
            self.subject_id,
            self.age,
            self.diagnosis,
            self.history.join(", "),
            self.symptoms,
            self.prescription
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> Subject {
        Subject::new(
            SubjectId::new("p1").unwrap(),
            "Ada",
            34,
            "flu",
            vec!["asthma".to_string(), "smoker".to_string()],
        )
    }

    #[test]
    fn test_snapshot_is_detached_from_subject() {
        let mut subject = subject();
        let record = CaseRecord::from_subject(
            &subject,
            DoctorId::new("doctor1").unwrap(),
            UNKNOWN_DOCTOR,
            "cough",
            "rest",
            Utc::now(),
        );
        subject.history.push("diabetes".to_string());
        subject.age = 35;

        assert_eq!(record.age, 34);
        assert_eq!(record.history, vec!["asthma", "smoker"]);
    }

    #[test]
    fn test_history_line_format() {
        let record = CaseRecord::from_subject(
            &subject(),
            DoctorId::new("doctor1").unwrap(),
            "Dr. Who",
            "cough",
            "rest",
            Utc::now(),
        );
        assert_eq!(
            record.history_line(),
            "Patient: p1 | Age: 34 | Diagnosis: flu | History: asthma, smoker | Symptoms: cough | Prescription: rest"
        );
    }

    #[test]
    fn test_wire_field_names() {
        let record = CaseRecord::from_subject(
            &subject(),
            DoctorId::new("doctor1").unwrap(),
            "Dr. Who",
            "cough",
            "rest",
            Utc::now(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["patient_id"], "p1");
        assert_eq!(value["patient_name"], "Ada");
        assert!(value.get("timestamp").is_some());
    }
}
