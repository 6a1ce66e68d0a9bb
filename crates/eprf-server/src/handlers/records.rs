//! Patient record lifecycle endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use eprf_shared::{IncidentId, IncidentStatus, PatientLetter, UserId};

use crate::api::AppState;
use crate::handlers::{success, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
    pub callsign: String,
    #[serde(default)]
    pub fleet_id: Option<String>,
}

/// `POST /api/records` — create a patient record.  The first patient of an
/// incident makes the caller the incident owner.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRecordRequest>,
) -> ApiResult {
    let record = state
        .collab
        .records()
        .create_patient(
            &req.incident_id,
            &req.patient_letter,
            &req.discord_id,
            &req.callsign,
            req.fleet_id,
        )
        .await?;
    Ok(success(json!({ "record": record })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsQuery {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
}

/// `GET /api/records` — either the patients of one incident
/// (`?incidentId=`), or every record visible to a user (`?userId=`; admin
/// identities see all).
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListRecordsQuery>,
) -> ApiResult {
    if let Some(incident_id) = &query.incident_id {
        let records = state.collab.records().list_patients(incident_id).await?;
        return Ok(success(json!({ "records": records })));
    }
    let user_id = query.user_id.ok_or_else(|| {
        crate::error::ApiError::BadRequest("userId or incidentId is required".to_string())
    })?;
    let records = state.collab.records().list_records(&user_id).await?;
    Ok(success(json!({ "records": records })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub status: IncidentStatus,
    pub discord_id: UserId,
}

/// `PUT /api/records` — move a record between incomplete and complete.
pub async fn update_status(
    State(state): State<AppState>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult {
    let record = state
        .collab
        .records()
        .update_status(&req.incident_id, &req.patient_letter, req.status, &req.discord_id)
        .await?;
    Ok(success(json!({ "record": record })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordRequest {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
}

/// `DELETE /api/records` — delete a patient record (incomplete only, unless
/// the caller is an admin).
pub async fn delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteRecordRequest>,
) -> ApiResult {
    state
        .collab
        .records()
        .delete_patient(&req.incident_id, &req.patient_letter, &req.discord_id)
        .await?;
    Ok(success(json!({ "deleted": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
    pub callsign: String,
    pub new_author_id: UserId,
    pub new_author_callsign: String,
}

/// `POST /api/records/transfer` — hand a patient record to a new author.
pub async fn transfer(
    State(state): State<AppState>,
    Json(req): Json<TransferRequest>,
) -> ApiResult {
    let record = state
        .collab
        .records()
        .transfer_patient(
            &req.incident_id,
            &req.patient_letter,
            &req.discord_id,
            &req.callsign,
            &req.new_author_id,
            &req.new_author_callsign,
        )
        .await?;
    Ok(success(json!({ "record": record })))
}
