//! HTTP route handlers for the prescription API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::clinical::core::errors::ClinicalError;
use crate::clinical::core::ids::{DoctorId, SubjectId};
use crate::tools::prescription_tools::{
    CREATE_OR_UPDATE_PATIENT, GET_ALL_PATIENTS, GET_DOCTOR_PAST_APPOINTMENTS, GET_DOCTOR_PATIENTS,
    GET_PATIENT_BY_ID, GET_PATIENT_PRESCRIPTIONS, GET_PRESCRIPTION_BY_ID,
};

use super::state::AppState;

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/patients", get(list_patients).post(upsert_patient))
        .route("/api/patients/{id}", get(get_patient))
        .route("/api/doctor-patients/{doctor_id}", get(doctor_patients))
        .route("/api/patient-prescriptions/{patient_id}", get(patient_prescriptions))
        .route("/api/prescriptions/{prescription_id}", get(get_prescription))
        .route(
            "/api/doctor-past-appointments/{doctor_id}",
            get(doctor_past_appointments),
        )
        .route("/api/generate_prescription", post(generate_prescription))
        .route("/api/save_prescription", post(save_prescription))
        .with_state(state)
}

/// Error returned by the handlers.
#[derive(Debug)]
pub struct ApiError(ClinicalError);

impl From<ClinicalError> for ApiError {
    fn from(err: ClinicalError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn missing_inputs() -> Self {
        Self(ClinicalError::invalid_argument("body", "missing inputs"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ClinicalError::SubjectNotFound(_)
            | ClinicalError::CaseRecordNotFound(_)
            | ClinicalError::ToolNotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ClinicalError::InvalidArguments { .. } => (StatusCode::BAD_REQUEST, self.0.to_string()),
            other => {
                tracing::error!("request failed: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "prescription-server",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn forward(state: &AppState, tool: &str, arguments: Value) -> ApiResult<Value> {
    Ok(Json(state.tools.call_tool_json(tool, arguments).await?))
}

async fn list_patients(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    forward(&state, GET_ALL_PATIENTS, json!({})).await
}

async fn upsert_patient(
    State(state): State<Arc<AppState>>,
    Json(patient): Json<Value>,
) -> ApiResult<Value> {
    forward(&state, CREATE_OR_UPDATE_PATIENT, patient).await
}

async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    forward(&state, GET_PATIENT_BY_ID, json!({ "patient_id": id })).await
}

async fn doctor_patients(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<String>,
) -> ApiResult<Value> {
    forward(&state, GET_DOCTOR_PATIENTS, json!({ "doctor_id": doctor_id })).await
}

async fn patient_prescriptions(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<String>,
) -> ApiResult<Value> {
    forward(&state, GET_PATIENT_PRESCRIPTIONS, json!({ "patient_id": patient_id })).await
}

async fn get_prescription(
    State(state): State<Arc<AppState>>,
    Path(prescription_id): Path<String>,
) -> ApiResult<Value> {
    forward(
        &state,
        GET_PRESCRIPTION_BY_ID,
        json!({ "prescription_id": prescription_id }),
    )
    .await
}

async fn doctor_past_appointments(
    State(state): State<Arc<AppState>>,
    Path(doctor_id): Path<String>,
) -> ApiResult<Value> {
    forward(&state, GET_DOCTOR_PAST_APPOINTMENTS, json!({ "doctor_id": doctor_id })).await
}

/// Prescription generation request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    /// Patient to draft for.
    pub patient_id: String,
    /// Presenting symptoms.
    pub symptoms: String,
    /// Doctor-edited text; skips generation when present.
    pub final_prescription: Option<String>,
}

/// Prescription generation response.
#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    /// Generated or echoed text.
    pub generated: String,
    /// Same text, under the name the save endpoint expects.
    pub prescription: String,
}

async fn generate_prescription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<GenerateResponse> {
    if request.patient_id.trim().is_empty() || request.symptoms.trim().is_empty() {
        return Err(ApiError::missing_inputs());
    }

    let prescription = match request.final_prescription.filter(|text| !text.trim().is_empty()) {
        Some(text) => text,
        None => {
            let subject_id = SubjectId::new(request.patient_id)
                .map_err(|_| ApiError::missing_inputs())?;
            state
                .engine
                .draft(&subject_id, &request.symptoms)
                .await?
                .prescription
        }
    };

    Ok(Json(GenerateResponse {
        generated: prescription.clone(),
        prescription,
    }))
}

/// Prescription save request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SaveRequest {
    /// Patient the prescription is for.
    pub patient_id: String,
    /// Presenting symptoms.
    pub symptoms: String,
    /// Accepted prescription text.
    pub prescription: String,
    /// Prescribing doctor.
    pub doctor_id: String,
}

async fn save_prescription(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveRequest>,
) -> ApiResult<Value> {
    if request.symptoms.trim().is_empty() || request.prescription.trim().is_empty() {
        return Err(ApiError::missing_inputs());
    }
    let subject_id = SubjectId::new(request.patient_id).map_err(|_| ApiError::missing_inputs())?;
    let doctor_id = DoctorId::new(request.doctor_id).map_err(|_| ApiError::missing_inputs())?;

    let confirmation = state
        .engine
        .save(&subject_id, &doctor_id, &request.symptoms, &request.prescription)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Prescription saved successfully",
        "confirmation": confirmation,
    })))
}
