//! Permission resolution endpoints.

use axum::extract::{Query, State};
use serde::Deserialize;
use serde_json::json;

use eprf_shared::{IncidentId, PatientLetter, UserId};

use crate::api::AppState;
use crate::handlers::{success, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessQuery {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub user_id: UserId,
}

/// `GET /api/access` — the caller's effective permission on one patient.
/// A store outage surfaces as a 500, which clients already treat as denied;
/// the answer is never silently elevated.
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> ApiResult {
    let permission = state
        .collab
        .access()
        .try_resolve_access(&query.incident_id, &query.patient_letter, &query.user_id)
        .await?;
    Ok(success(json!({ "permission": permission })))
}

/// `GET /api/can-transfer` — whether the caller may hand the patient record
/// to someone else (incident owner or current author only).
pub async fn can_transfer(
    State(state): State<AppState>,
    Query(query): Query<AccessQuery>,
) -> ApiResult {
    let can_transfer = state
        .collab
        .access()
        .can_transfer_patient(&query.incident_id, &query.patient_letter, &query.user_id)
        .await?;
    Ok(success(json!({ "canTransfer": can_transfer })))
}
