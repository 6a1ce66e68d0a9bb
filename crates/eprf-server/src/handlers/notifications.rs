//! Notification endpoints.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use eprf_shared::types::de_opt_patient_letter;
use eprf_shared::{IncidentId, PatientLetter, UserId};

use crate::api::AppState;
use crate::error::ApiError;
use crate::handlers::{success, ApiResult};

const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub discord_id: UserId,
    #[serde(default)]
    pub unread_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /api/notifications` — a user's notifications plus their unread
/// count.
pub async fn list(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    let listed = state
        .collab
        .notifications()
        .list(
            &query.discord_id,
            query.unread_only,
            query.limit.unwrap_or(DEFAULT_LIST_LIMIT),
        )
        .await?;
    Ok(success(json!({
        "notifications": listed.notifications,
        "unreadCount": listed.unread_count,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub target_discord_id: UserId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
    #[serde(default)]
    pub from_callsign: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

/// `POST /api/notifications` — create a notification explicitly.
pub async fn create(State(state): State<AppState>, Json(req): Json<CreateRequest>) -> ApiResult {
    let notification = state
        .collab
        .notifications()
        .create(
            &req.target_discord_id,
            &req.kind,
            &req.title,
            &req.message,
            req.incident_id.as_ref(),
            req.patient_letter.as_ref(),
            req.from_callsign.as_deref(),
            req.link.as_deref(),
        )
        .await?;
    Ok(success(json!({ "notification": notification })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub action: String,
    pub discord_id: UserId,
    #[serde(default)]
    pub notification_id: Option<Uuid>,
    #[serde(default)]
    pub notification_ids: Option<Vec<Uuid>>,
}

/// `PUT /api/notifications` — `action` ∈ {`mark-read`, `mark-all-read`,
/// `mark-multiple-read`}.
pub async fn update(State(state): State<AppState>, Json(req): Json<UpdateRequest>) -> ApiResult {
    let service = state.collab.notifications();
    let updated = match req.action.as_str() {
        "mark-read" => {
            let id = req
                .notification_id
                .ok_or_else(|| ApiError::BadRequest("notificationId is required".to_string()))?;
            service.mark_read(id, &req.discord_id).await?;
            1
        }
        "mark-all-read" => service.mark_all_read(&req.discord_id).await?,
        "mark-multiple-read" => {
            let ids = req
                .notification_ids
                .ok_or_else(|| ApiError::BadRequest("notificationIds is required".to_string()))?;
            service.mark_many_read(&ids, &req.discord_id).await?
        }
        other => {
            return Err(ApiError::BadRequest(format!("unknown action: {other}")));
        }
    };
    Ok(success(json!({ "updated": updated })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub action: String,
    pub discord_id: UserId,
    #[serde(default)]
    pub notification_id: Option<Uuid>,
}

/// `DELETE /api/notifications` — `action` ∈ {`delete-one`, `clear-read`,
/// `clear-all`}.
pub async fn delete(State(state): State<AppState>, Json(req): Json<DeleteRequest>) -> ApiResult {
    let service = state.collab.notifications();
    let deleted = match req.action.as_str() {
        "delete-one" => {
            let id = req
                .notification_id
                .ok_or_else(|| ApiError::BadRequest("notificationId is required".to_string()))?;
            service.delete_one(id, &req.discord_id).await?;
            1
        }
        "clear-read" => service.clear_read(&req.discord_id).await?,
        "clear-all" => service.clear_all(&req.discord_id).await?,
        other => {
            return Err(ApiError::BadRequest(format!("unknown action: {other}")));
        }
    };
    Ok(success(json!({ "deleted": deleted })))
}
