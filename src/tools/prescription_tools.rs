//! Patient and prescription tools served to the backend.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::clinical::core::case_record::CaseRecord;
use crate::clinical::core::config::ClinicConfig;
use crate::clinical::core::errors::{ClinicalError, ClinicalResult};
use crate::clinical::core::ids::{CaseRecordId, DoctorId, SubjectId};
use crate::clinical::core::subject::Subject;
use crate::clinical::retrieval::search::NO_HISTORY;
use crate::clinical::retrieval::similar_cases::SimilarCaseRetriever;
use crate::clinical::storage::record_store::{CaseFilter, RecordStore};
use crate::tools::envelope::ToolOutput;
use crate::tools::registry::{ToolDefinition, ToolFuture, ToolHandler, ToolRegistry};
use crate::tools::schema::{ParamType, ToolArgs, ToolSchema};

/// Lists every subject.
pub const GET_ALL_PATIENTS: &str = "get_all_patients";
/// Upserts a subject.
pub const CREATE_OR_UPDATE_PATIENT: &str = "create_or_update_patient";
/// Lists subjects booked with a doctor.
pub const GET_DOCTOR_PATIENTS: &str = "get_doctor_patients";
/// Fetches one subject.
pub const GET_PATIENT_BY_ID: &str = "get_patient_by_id";
/// Lists a subject's case records.
pub const GET_PATIENT_PRESCRIPTIONS: &str = "get_patient_prescriptions";
/// Fetches one case record.
pub const GET_PRESCRIPTION_BY_ID: &str = "get_prescription_by_id";
/// Renders the log as summary lines.
pub const GET_PRESCRIPTION_HISTORY: &str = "get_prescription_history";
/// Appends a case record.
pub const ADD_PRESCRIPTION: &str = "add_prescription";
/// Ranks similar past prescriptions.
pub const GET_SIMILAR_PRESCRIPTIONS: &str = "get_similar_prescriptions";
/// Lists a doctor's case records.
pub const GET_DOCTOR_PAST_APPOINTMENTS: &str = "get_doctor_past_appointments";

/// Everything the prescription tools read from or write to.
pub struct PrescriptionTools {
    store: Arc<dyn RecordStore>,
    retriever: SimilarCaseRetriever,
    clinic: ClinicConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tool {
    GetAllPatients,
    CreateOrUpdatePatient,
    GetDoctorPatients,
    GetPatientById,
    GetPatientPrescriptions,
    GetPrescriptionById,
    GetPrescriptionHistory,
    AddPrescription,
    GetSimilarPrescriptions,
    GetDoctorPastAppointments,
}

impl Tool {
    const ALL: [Self; 10] = [
        Self::GetAllPatients,
        Self::CreateOrUpdatePatient,
        Self::GetDoctorPatients,
        Self::GetPatientById,
        Self::GetPatientPrescriptions,
        Self::GetPrescriptionById,
        Self::GetPrescriptionHistory,
        Self::AddPrescription,
        Self::GetSimilarPrescriptions,
        Self::GetDoctorPastAppointments,
    ];

    fn definition(self) -> ToolDefinition {
        match self {
            Self::GetAllPatients => ToolDefinition::new(
                GET_ALL_PATIENTS,
                "Get All Patients",
                "List every patient in the database",
                ToolSchema::new(),
            ),
            Self::CreateOrUpdatePatient => ToolDefinition::new(
                CREATE_OR_UPDATE_PATIENT,
                "Create or Update Patient",
                "Register a patient or replace the stored record with the same id",
                ToolSchema::new()
                    .required("id", ParamType::String, "Patient identifier")
                    .required("name", ParamType::String, "Full name")
                    .required("age", ParamType::Number, "Age in years")
                    .optional("email", ParamType::String, "Contact email")
                    .required("diagnosis", ParamType::String, "Current diagnosis")
                    .required("history", ParamType::StringArray, "Medical history items")
                    .optional(
                        "selectedDoctor",
                        ParamType::String,
                        "Doctor the patient booked with",
                    ),
            ),
            Self::GetDoctorPatients => ToolDefinition::new(
                GET_DOCTOR_PATIENTS,
                "Get Doctor Patients",
                "List the patients booked with a doctor",
                ToolSchema::new().required("doctor_id", ParamType::String, "Doctor identifier"),
            ),
            Self::GetPatientById => ToolDefinition::new(
                GET_PATIENT_BY_ID,
                "Get Patient by ID",
                "Fetch a single patient record",
                ToolSchema::new().required("patient_id", ParamType::String, "Patient identifier"),
            ),
            Self::GetPatientPrescriptions => ToolDefinition::new(
                GET_PATIENT_PRESCRIPTIONS,
                "Get Patient Prescriptions",
                "List a patient's prescriptions, newest first",
                ToolSchema::new().required("patient_id", ParamType::String, "Patient identifier"),
            ),
            Self::GetPrescriptionById => ToolDefinition::new(
                GET_PRESCRIPTION_BY_ID,
                "Get Prescription by ID",
                "Fetch a single prescription record",
                ToolSchema::new().required(
                    "prescription_id",
                    ParamType::String,
                    "Prescription identifier",
                ),
            ),
            Self::GetPrescriptionHistory => ToolDefinition::new(
                GET_PRESCRIPTION_HISTORY,
                "Get Prescription History",
                "Read the prescription log as summary lines, newest first",
                ToolSchema::new().optional(
                    "patient_id",
                    ParamType::String,
                    "Restrict to one patient",
                ),
            ),
            Self::AddPrescription => ToolDefinition::new(
                ADD_PRESCRIPTION,
                "Add Prescription",
                "Append a new prescription entry to the history log",
                ToolSchema::new()
                    .required("patient_id", ParamType::String, "Patient identifier")
                    .required("symptoms", ParamType::String, "Presenting symptoms")
                    .required("prescription", ParamType::String, "Prescription text")
                    .required("doctor_id", ParamType::String, "Prescribing doctor"),
            ),
            Self::GetSimilarPrescriptions => ToolDefinition::new(
                GET_SIMILAR_PRESCRIPTIONS,
                "Get Similar Prescriptions",
                "Retrieve top similar past prescriptions by embedding similarity",
                ToolSchema::new()
                    .required("patient_id", ParamType::String, "Patient identifier")
                    .required("symptoms", ParamType::String, "Presenting symptoms"),
            ),
            Self::GetDoctorPastAppointments => ToolDefinition::new(
                GET_DOCTOR_PAST_APPOINTMENTS,
                "Get Doctor Past Appointments",
                "List the prescriptions written by a doctor, newest first",
                ToolSchema::new().required("doctor_id", ParamType::String, "Doctor identifier"),
            ),
        }
    }
}

struct BoundTool {
    tools: Arc<PrescriptionTools>,
    tool: Tool,
}

impl ToolHandler for BoundTool {
    fn call(&self, args: ToolArgs) -> ToolFuture<'_> {
        Box::pin(self.tools.run(self.tool, args))
    }
}

impl PrescriptionTools {
    /// Create the tool context.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        retriever: SimilarCaseRetriever,
        clinic: ClinicConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            clinic,
        }
    }

    /// Register every prescription tool.
    ///
    /// # Errors
    /// Returns [`ClinicalError::DuplicateTool`] if a name is already taken.
    pub fn register(self, registry: &mut ToolRegistry) -> ClinicalResult<()> {
        let tools = Arc::new(self);
        for tool in Tool::ALL {
            registry.register_tool(
                tool.definition(),
                BoundTool {
                    tools: Arc::clone(&tools),
                    tool,
                },
            )?;
        }
        Ok(())
    }

    async fn run(&self, tool: Tool, args: ToolArgs) -> ClinicalResult<ToolOutput> {
        match tool {
            Tool::GetAllPatients => ToolOutput::json(&self.store.list_subjects().await?),
            Tool::CreateOrUpdatePatient => self.create_or_update_patient(&args).await,
            Tool::GetDoctorPatients => {
                let doctor_id = doctor_id(&args, "doctor_id")?;
                ToolOutput::json(&self.store.list_subjects_by_doctor(&doctor_id).await?)
            }
            Tool::GetPatientById => {
                let subject_id = subject_id(&args, "patient_id")?;
                ToolOutput::json(&self.subject(&subject_id).await?)
            }
            Tool::GetPatientPrescriptions => {
                let subject_id = subject_id(&args, "patient_id")?;
                ToolOutput::json(&self.newest_first(CaseFilter::Subject(subject_id)).await?)
            }
            Tool::GetPrescriptionById => {
                let raw = non_empty(&args, "prescription_id")?;
                let record_id = CaseRecordId::new(raw).map_err(|_| {
                    ClinicalError::invalid_argument("prescription_id", "must not be empty")
                })?;
                let record = self
                    .store
                    .find_case_record_by_id(&record_id)
                    .await?
                    .ok_or_else(|| ClinicalError::CaseRecordNotFound(record_id.to_string()))?;
                ToolOutput::json(&record)
            }
            Tool::GetPrescriptionHistory => self.prescription_history(&args).await,
            Tool::AddPrescription => self.add_prescription(&args).await,
            Tool::GetSimilarPrescriptions => {
                let subject_id = subject_id(&args, "patient_id")?;
                let symptoms = args.str("symptoms")?;
                let text = self
                    .retriever
                    .similar_cases_text(&subject_id, symptoms)
                    .await?;
                Ok(ToolOutput::Text(text))
            }
            Tool::GetDoctorPastAppointments => {
                let doctor_id = doctor_id(&args, "doctor_id")?;
                ToolOutput::json(&self.newest_first(CaseFilter::Doctor(doctor_id)).await?)
            }
        }
    }

    async fn subject(&self, subject_id: &SubjectId) -> ClinicalResult<Subject> {
        self.store
            .find_subject_by_id(subject_id)
            .await?
            .ok_or_else(|| ClinicalError::SubjectNotFound(subject_id.to_string()))
    }

    async fn newest_first(&self, filter: CaseFilter) -> ClinicalResult<Vec<CaseRecord>> {
        let mut records = self.store.find_case_records(filter).await?;
        records.reverse();
        Ok(records)
    }

    async fn create_or_update_patient(&self, args: &ToolArgs) -> ClinicalResult<ToolOutput> {
        let id = subject_id(args, "id")?;
        let mut subject = Subject::new(
            id,
            args.str("name")?,
            parse_age(args.number("age")?)?,
            args.str("diagnosis")?,
            args.string_list("history")?,
        );
        subject.email = args.opt_str("email").map(str::to_string);
        subject.selected_doctor = match args.opt_str("selectedDoctor") {
            Some(_) => Some(doctor_id(args, "selectedDoctor")?),
            None => None,
        };

        let stored = self.store.upsert_subject(subject).await?;
        info!(subject = %stored.id, "stored patient");
        ToolOutput::json(&stored)
    }

    async fn prescription_history(&self, args: &ToolArgs) -> ClinicalResult<ToolOutput> {
        let filter = match args.opt_str("patient_id") {
            Some(_) => CaseFilter::Subject(subject_id(args, "patient_id")?),
            None => CaseFilter::All,
        };
        let records = self.newest_first(filter).await?;
        if records.is_empty() {
            return Ok(ToolOutput::Text(NO_HISTORY.to_string()));
        }
        let lines: Vec<String> = records.iter().map(CaseRecord::history_line).collect();
        Ok(ToolOutput::Text(lines.join("\n")))
    }

    async fn add_prescription(&self, args: &ToolArgs) -> ClinicalResult<ToolOutput> {
        let subject_id = subject_id(args, "patient_id")?;
        let symptoms = args.str("symptoms")?;
        let prescription = args.str("prescription")?;
        let doctor_id = doctor_id(args, "doctor_id")?;

        let subject = self.subject(&subject_id).await?;
        let doctor_name = self.clinic.doctor_name(doctor_id.as_str());
        let record = CaseRecord::from_subject(
            &subject,
            doctor_id,
            doctor_name,
            symptoms,
            prescription,
            Utc::now(),
        );
        let record_id = record.id.clone();
        self.store.append_case_record(record).await?;
        info!(subject = %subject_id, prescription = %record_id, "logged prescription");
        Ok(ToolOutput::Text(format!("Prescription logged as {record_id}.")))
    }
}

fn non_empty<'a>(args: &'a ToolArgs, name: &str) -> ClinicalResult<&'a str> {
    let value = args.str(name)?;
    if value.trim().is_empty() {
        return Err(ClinicalError::invalid_argument(name, "must not be empty"));
    }
    Ok(value)
}

fn subject_id(args: &ToolArgs, name: &str) -> ClinicalResult<SubjectId> {
    SubjectId::new(non_empty(args, name)?)
        .map_err(|_| ClinicalError::invalid_argument(name, "must not be empty"))
}

fn doctor_id(args: &ToolArgs, name: &str) -> ClinicalResult<DoctorId> {
    DoctorId::new(non_empty(args, name)?)
        .map_err(|_| ClinicalError::invalid_argument(name, "must not be empty"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_age(value: f64) -> ClinicalResult<u32> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
        return Err(ClinicalError::invalid_argument(
            "age",
            "must be a non-negative whole number",
        ));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::testing::prescription_registry;

    async fn registry_with(cases: &[(&str, &str)]) -> ToolRegistry {
        prescription_registry(cases).await
    }

    async fn call_text(registry: &ToolRegistry, name: &str, args: Value) -> String {
        registry.call_tool(name, &args).await.unwrap().joined_text()
    }

    #[tokio::test]
    async fn test_all_tools_listed_in_order() {
        let registry = registry_with(&[]).await;
        let names: Vec<&str> = registry.list_tools().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                GET_ALL_PATIENTS,
                CREATE_OR_UPDATE_PATIENT,
                GET_DOCTOR_PATIENTS,
                GET_PATIENT_BY_ID,
                GET_PATIENT_PRESCRIPTIONS,
                GET_PRESCRIPTION_BY_ID,
                GET_PRESCRIPTION_HISTORY,
                ADD_PRESCRIPTION,
                GET_SIMILAR_PRESCRIPTIONS,
                GET_DOCTOR_PAST_APPOINTMENTS,
            ]
        );
    }

    #[tokio::test]
    async fn test_patient_lookup() {
        let registry = registry_with(&[]).await;
        let text = call_text(&registry, GET_PATIENT_BY_ID, json!({"patient_id": "p1"})).await;
        let subject: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(subject["age"], 34);
        assert_eq!(subject["history"], json!(["asthma"]));

        let err = registry
            .call_tool(GET_PATIENT_BY_ID, &json!({"patient_id": "p404"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(id) if id == "p404"));
    }

    #[tokio::test]
    async fn test_create_and_list_by_doctor() {
        let registry = registry_with(&[]).await;
        call_text(
            &registry,
            CREATE_OR_UPDATE_PATIENT,
            json!({
                "id": "p2",
                "name": "Bo",
                "age": 50,
                "diagnosis": "migraine",
                "history": [],
                "selectedDoctor": "doctor1"
            }),
        )
        .await;
        let text = call_text(&registry, GET_DOCTOR_PATIENTS, json!({"doctor_id": "doctor1"})).await;
        let subjects: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(subjects.as_array().unwrap().len(), 1);
        assert_eq!(subjects[0]["id"], "p2");
        assert_eq!(subjects[0]["selectedDoctor"], "doctor1");
    }

    #[tokio::test]
    async fn test_fractional_age_rejected() {
        let registry = registry_with(&[]).await;
        let err = registry
            .call_tool(
                CREATE_OR_UPDATE_PATIENT,
                &json!({"id": "p2", "name": "Bo", "age": 4.5, "diagnosis": "x", "history": []}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::InvalidArguments { field, .. } if field == "age"));
    }

    #[tokio::test]
    async fn test_add_prescription_then_history_newest_first() {
        let registry = registry_with(&[("fever", "paracetamol")]).await;
        let logged = call_text(
            &registry,
            ADD_PRESCRIPTION,
            json!({
                "patient_id": "p1",
                "symptoms": "cough",
                "prescription": "honey",
                "doctor_id": "doctor1"
            }),
        )
        .await;
        assert!(logged.starts_with("Prescription logged as prescription-"));
        assert!(logged.ends_with('.'));

        let history = call_text(&registry, GET_PRESCRIPTION_HISTORY, Value::Null).await;
        let lines: Vec<&str> = history.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Patient: p1 | Age: 34 | Diagnosis: flu | History: asthma | Symptoms: cough | Prescription: honey",
                "Patient: p1 | Age: 34 | Diagnosis: flu | History: asthma | Symptoms: fever | Prescription: paracetamol",
            ]
        );

        let appointments = call_text(
            &registry,
            GET_DOCTOR_PAST_APPOINTMENTS,
            json!({"doctor_id": "doctor1"}),
        )
        .await;
        let records: Value = serde_json::from_str(&appointments).unwrap();
        assert_eq!(records[0]["symptoms"], "cough");
        assert_eq!(records[0]["doctor_name"], "Dr. Smith");
    }

    #[tokio::test]
    async fn test_add_prescription_unknown_patient() {
        let registry = registry_with(&[]).await;
        let err = registry
            .call_tool(
                ADD_PRESCRIPTION,
                &json!({
                    "patient_id": "p9",
                    "symptoms": "s",
                    "prescription": "p",
                    "doctor_id": "d"
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::SubjectNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_history_text() {
        let registry = registry_with(&[]).await;
        let text = call_text(
            &registry,
            GET_PRESCRIPTION_HISTORY,
            json!({"patient_id": "p1"}),
        )
        .await;
        assert_eq!(text, "No history available.");
    }

    #[tokio::test]
    async fn test_prescription_by_id_missing() {
        let registry = registry_with(&[]).await;
        let err = registry
            .call_tool(GET_PRESCRIPTION_BY_ID, &json!({"prescription_id": "prescription-x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ClinicalError::CaseRecordNotFound(id) if id == "prescription-x"));
    }

    #[tokio::test]
    async fn test_similar_prescriptions_tool() {
        let registry = registry_with(&[]).await;
        let text = call_text(
            &registry,
            GET_SIMILAR_PRESCRIPTIONS,
            json!({"patient_id": "p1", "symptoms": "cough"}),
        )
        .await;
        assert_eq!(text, "No similar prescriptions found.");

        let registry = registry_with(&[("cough", "honey")]).await;
        let text = call_text(
            &registry,
            GET_SIMILAR_PRESCRIPTIONS,
            json!({"patient_id": "p1", "symptoms": "cough"}),
        )
        .await;
        assert_eq!(text, "Patient: p1 | Symptoms: cough | Prescription: honey");
    }
}
