//! Version history endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eprf_shared::types::de_opt_patient_letter;
use eprf_shared::{IncidentId, PatientLetter, SectionDocument, UserId};

use crate::api::AppState;
use crate::handlers::{success, ApiResult};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub discord_id: UserId,
    pub incident_id: IncidentId,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub version_id: Option<Uuid>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/version-history` — one entry by `versionId`, or the incident's
/// history newest first, optionally narrowed by patient and section.
pub async fn query(State(state): State<AppState>, Query(query): Query<HistoryQuery>) -> ApiResult {
    if let Some(version_id) = query.version_id {
        let version = state
            .collab
            .history()
            .get_version(&query.incident_id, version_id)
            .await?;
        return Ok(success(json!({ "version": version })));
    }

    let versions = state
        .collab
        .history()
        .list_history(
            &query.incident_id,
            query.patient_letter.as_ref(),
            query.section.as_deref(),
            query.limit,
        )
        .await?;
    Ok(success(json!({ "versions": versions })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub section_name: String,
    pub discord_id: UserId,
    pub callsign: String,
    #[serde(default)]
    pub previous_data: SectionDocument,
    pub new_data: SectionDocument,
    #[serde(default)]
    pub change_summary: Option<String>,
}

/// `POST /api/version-history` — save a section and record the change.
/// The server computes the diff; identical snapshots write nothing.
pub async fn record(State(state): State<AppState>, Json(req): Json<RecordRequest>) -> ApiResult {
    let version = state
        .collab
        .history()
        .record_version(
            &req.incident_id,
            &req.patient_letter,
            &req.section_name,
            &req.discord_id,
            &req.callsign,
            &req.previous_data,
            &req.new_data,
            req.change_summary,
        )
        .await?;

    // The section itself resolves last-write-wins to the new snapshot.
    if version.is_some() {
        state
            .collab
            .store()
            .upsert_section(&req.incident_id, &req.patient_letter, &req.section_name, &req.new_data)
            .await?;
        state
            .collab
            .store()
            .touch_incident(&req.incident_id, &req.patient_letter)
            .await?;
    }

    Ok(success(json!({
        "skipped": version.is_none(),
        "version": version,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub incident_id: IncidentId,
    pub version_id: Uuid,
    pub discord_id: UserId,
    pub callsign: String,
}

/// `PUT /api/version-history` — restore the section to the state before the
/// named version.
pub async fn restore(State(state): State<AppState>, Json(req): Json<RestoreRequest>) -> ApiResult {
    let data = state
        .collab
        .history()
        .restore(&req.incident_id, req.version_id, &req.discord_id, &req.callsign)
        .await?;
    Ok(success(json!({ "data": data })))
}
