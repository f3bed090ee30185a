//! Prescription drafting orchestration.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::clinical::adapters::completion::CompletionService;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::core::ids::{DoctorId, SubjectId};
use crate::clinical::core::subject::Subject;
use crate::clinical::prompt::prompt_builder::{PrescriptionPromptParts, build_prescription_prompt};
use crate::rpc::client::ToolClient;
use crate::tools::prescription_tools::{
    ADD_PRESCRIPTION, GET_PATIENT_BY_ID, GET_SIMILAR_PRESCRIPTIONS,
};

/// Generated prescription with the context it was drafted from.
#[derive(Clone, Debug)]
pub struct PrescriptionDraft {
    /// Subject the draft is for.
    pub subject: Subject,
    /// Similar-cases block fed to the prompt.
    pub similar_cases: String,
    /// Full prompt sent to the model.
    pub prompt: String,
    /// Trimmed model output.
    pub prescription: String,
}

/// Drafts prescriptions from retrieved cases and saves accepted ones.
pub struct PrescriptionEngine {
    tools: Arc<ToolClient>,
    completion: Arc<dyn CompletionService>,
}

impl PrescriptionEngine {
    /// Create an engine over a connected tool client.
    #[must_use]
    pub fn new(tools: Arc<ToolClient>, completion: Arc<dyn CompletionService>) -> Self {
        Self { tools, completion }
    }

    /// Draft a prescription for new symptoms.
    ///
    /// # Errors
    /// Returns [`ClinicalError::InvalidArguments`] for blank symptoms, the tool
    /// server's typed failure, or the completion error.
    pub async fn draft(
        &self,
        subject_id: &SubjectId,
        symptoms: &str,
    ) -> ClinicalResult<PrescriptionDraft> {
        if symptoms.trim().is_empty() {
            return Err(ClinicalError::invalid_argument("symptoms", "must not be empty"));
        }

        let subject: Subject = self
            .tools
            .call_tool_json(GET_PATIENT_BY_ID, json!({ "patient_id": subject_id }))
            .await?;
        let similar_cases = self
            .tools
            .call_tool_text(
                GET_SIMILAR_PRESCRIPTIONS,
                json!({ "patient_id": subject_id, "symptoms": symptoms }),
            )
            .await?
            .trim()
            .to_string();

        let prompt = build_prescription_prompt(&PrescriptionPromptParts {
            subject: &subject,
            symptoms,
            similar_cases: &similar_cases,
        });
        debug!(subject = %subject_id, "prescription prompt:\n{prompt}");

        let prescription = self.completion.complete(&prompt).await?.trim().to_string();
        info!(subject = %subject_id, chars = prescription.len(), "drafted prescription");

        Ok(PrescriptionDraft {
            subject,
            similar_cases,
            prompt,
            prescription,
        })
    }

    /// Log an accepted prescription.
    ///
    /// # Errors
    /// Returns the tool server's typed failure.
    pub async fn save(
        &self,
        subject_id: &SubjectId,
        doctor_id: &DoctorId,
        symptoms: &str,
        prescription: &str,
    ) -> ClinicalResult<String> {
        self.tools
            .call_tool_text(
                ADD_PRESCRIPTION,
                json!({
                    "patient_id": subject_id,
                    "symptoms": symptoms,
                    "prescription": prescription,
                    "doctor_id": doctor_id,
                }),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubCompletion, in_process_client};

    #[tokio::test]
    async fn test_draft_uses_retrieved_cases() {
        let tools = Arc::new(in_process_client(&[("cough", "honey")]).await);
        let completion = Arc::new(StubCompletion::replying("  Rest and fluids.\n"));
        let engine = PrescriptionEngine::new(tools, completion.clone());

        let draft = engine
            .draft(&SubjectId::new("p1").unwrap(), "cough")
            .await
            .unwrap();
        assert_eq!(draft.prescription, "Rest and fluids.");
        assert_eq!(
            draft.similar_cases,
            "Patient: p1 | Symptoms: cough | Prescription: honey"
        );
        let prompt = completion.last_prompt().unwrap();
        assert!(prompt.contains("Patient: p1 | Symptoms: cough | Prescription: honey"));
        assert!(prompt.contains("- Age: 34"));
    }

    #[tokio::test]
    async fn test_draft_unknown_subject() {
        let tools = Arc::new(in_process_client(&[]).await);
        let completion = Arc::new(StubCompletion::replying("x"));
        let engine = PrescriptionEngine::new(tools, completion.clone());

        let err = engine
            .draft(&SubjectId::new("p9").unwrap(), "cough")
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(_)));
        assert!(completion.last_prompt().is_none());
    }

    #[tokio::test]
    async fn test_save_logs_prescription() {
        let tools = Arc::new(in_process_client(&[]).await);
        let engine = PrescriptionEngine::new(tools, Arc::new(StubCompletion::default()));

        let message = engine
            .save(
                &SubjectId::new("p1").unwrap(),
                &DoctorId::new("doctor1").unwrap(),
                "cough",
                "honey",
            )
            .await
            .unwrap();
        assert!(message.starts_with("Prescription logged as prescription-"));
    }
}
