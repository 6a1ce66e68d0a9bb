//! Collaborator and sharing endpoints.
//!
//! The wire keeps the client's empty-string convention for "incident-wide":
//! a missing or empty `patientLetter` means the grant covers every patient.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use eprf_shared::types::de_opt_patient_letter;
use eprf_shared::{IncidentId, PatientLetter, PermissionLevel, UserId};

use crate::api::AppState;
use crate::error::ApiError;
use crate::handlers::{success, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    #[serde(default)]
    pub roster: bool,
}

/// `GET /api/collaborators` — grants in a scope, or the mentionable roster
/// with `?roster=true`.
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    if query.roster {
        let roster = state.collab.sharing().roster(&query.incident_id).await?;
        return Ok(success(json!({ "roster": roster })));
    }
    let collaborators = match &query.patient_letter {
        Some(patient) => {
            state
                .collab
                .sharing()
                .list_patient_collaborators(&query.incident_id, patient)
                .await?
        }
        None => {
            state
                .collab
                .sharing()
                .list_collaborators(&query.incident_id)
                .await?
        }
    };
    Ok(success(json!({ "collaborators": collaborators })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    pub discord_id: UserId,
    pub callsign: String,
    pub permission: PermissionLevel,
    pub requested_by: UserId,
    pub requested_by_callsign: String,
}

/// `POST /api/collaborators` — grant a user access to a scope.
pub async fn add(State(state): State<AppState>, Json(req): Json<AddRequest>) -> ApiResult {
    let grant = state
        .collab
        .sharing()
        .add_collaborator(
            &req.incident_id,
            req.patient_letter.as_ref(),
            &req.discord_id,
            &req.callsign,
            req.permission,
            &req.requested_by,
            &req.requested_by_callsign,
        )
        .await?;
    Ok(success(json!({ "collaborator": grant })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub action: Option<String>,
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    #[serde(default)]
    pub discord_id: Option<UserId>,
    #[serde(default)]
    pub permission: Option<PermissionLevel>,
    pub requested_by: UserId,
    // transfer-ownership fields
    #[serde(default)]
    pub from_callsign: Option<String>,
    #[serde(default)]
    pub to_discord_id: Option<UserId>,
    #[serde(default)]
    pub to_callsign: Option<String>,
}

/// `PUT /api/collaborators` — change a grant's level, or with
/// `action: "transfer-ownership"` hand the incident to a new owner.
pub async fn update(State(state): State<AppState>, Json(req): Json<UpdateRequest>) -> ApiResult {
    if req.action.as_deref() == Some("transfer-ownership") {
        let to = req
            .to_discord_id
            .ok_or_else(|| ApiError::BadRequest("toDiscordId is required".to_string()))?;
        let to_callsign = req
            .to_callsign
            .ok_or_else(|| ApiError::BadRequest("toCallsign is required".to_string()))?;
        let from_callsign = req.from_callsign.unwrap_or_default();

        state
            .collab
            .sharing()
            .transfer_ownership(
                &req.incident_id,
                &req.requested_by,
                &from_callsign,
                &to,
                &to_callsign,
                &req.requested_by,
            )
            .await?;
        return Ok(success(json!({ "transferred": true })));
    }

    let target = req
        .discord_id
        .ok_or_else(|| ApiError::BadRequest("discordId is required".to_string()))?;
    let permission = req
        .permission
        .ok_or_else(|| ApiError::BadRequest("permission is required".to_string()))?;

    let grant = state
        .collab
        .sharing()
        .update_collaborator(
            &req.incident_id,
            req.patient_letter.as_ref(),
            &target,
            permission,
            &req.requested_by,
        )
        .await?;
    Ok(success(json!({ "collaborator": grant })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    pub discord_id: UserId,
    pub requested_by: UserId,
}

/// `DELETE /api/collaborators` — revoke a grant.
pub async fn remove(State(state): State<AppState>, Json(req): Json<RemoveRequest>) -> ApiResult {
    state
        .collab
        .sharing()
        .remove_collaborator(
            &req.incident_id,
            req.patient_letter.as_ref(),
            &req.discord_id,
            &req.requested_by,
        )
        .await?;
    Ok(success(json!({ "removed": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkRequest {
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    pub permission: PermissionLevel,
    pub requested_by: UserId,
}

/// `POST /api/share-links` — mint a capability token for a scope.
pub async fn create_share_link(
    State(state): State<AppState>,
    Json(req): Json<ShareLinkRequest>,
) -> ApiResult {
    let link = state
        .collab
        .sharing()
        .create_share_link(
            &req.incident_id,
            req.patient_letter.as_ref(),
            req.permission,
            &req.requested_by,
        )
        .await?;
    Ok(success(json!({ "shareLink": link })))
}
