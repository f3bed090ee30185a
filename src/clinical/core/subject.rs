//! Patient records.

use serde::{Deserialize, Serialize};

use crate::clinical::core::ids::{DoctorId, SubjectId};

/// A patient the retrieval query is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique key assigned by the registration system.
    pub id: SubjectId,
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: u32,
    /// Contact address, when provided at registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Current working diagnosis.
    pub diagnosis: String,
    /// Ordered medical history items.
    pub history: Vec<String>,
    /// Clinician the patient booked with.
    #[serde(
        rename = "selectedDoctor",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub selected_doctor: Option<DoctorId>,
}

impl Subject {
    /// Create a subject without optional contact or booking details.
    #[must_use]
    pub fn new(
        id: SubjectId,
        name: impl Into<String>,
        age: u32,
        diagnosis: impl Into<String>,
        history: Vec<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            age,
            email: None,
            diagnosis: diagnosis.into(),
            history,
            selected_doctor: None,
        }
    }
}
