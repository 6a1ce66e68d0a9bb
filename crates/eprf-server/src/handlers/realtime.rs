//! Realtime event ingestion, chat history, and the long-poll fallback.
//!
//! `POST /api/realtime-event` takes the same `type`-tagged shape the hub
//! broadcasts.  Presence and cursor posts are advisory: a store failure is
//! logged and the request still succeeds, so a flaky disk cannot break the
//! form.  Chat posts surface failures — a message the sender believes was
//! sent must actually be persisted.

use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use eprf_shared::constants::CHAT_HISTORY_LIMIT;
use eprf_shared::types::de_opt_patient_letter;
use eprf_shared::{ChatType, IncidentId, PatientLetter, UserId};

use eprf_collab::EventScope;

use crate::api::AppState;
use crate::handlers::{success, ApiResult};

/// Maximum long-poll wait; clients asking for more are clamped.
const POLL_MAX_WAIT_MS: u64 = 25_000;
const POLL_DEFAULT_WAIT_MS: u64 = 20_000;
/// Batch cap per poll response.
const POLL_MAX_EVENTS: usize = 50;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RealtimeEventRequest {
    #[serde(rename_all = "camelCase")]
    CursorUpdate {
        incident_id: IncidentId,
        patient_letter: PatientLetter,
        discord_id: UserId,
        callsign: String,
        #[serde(default)]
        field_name: String,
    },
    #[serde(rename_all = "camelCase")]
    CursorLeave {
        incident_id: IncidentId,
        patient_letter: PatientLetter,
        discord_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        incident_id: IncidentId,
        #[serde(default, deserialize_with = "de_opt_patient_letter")]
        patient_letter: Option<PatientLetter>,
        chat_type: ChatType,
        discord_id: UserId,
        callsign: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    PresenceUpdate {
        incident_id: IncidentId,
        patient_letter: PatientLetter,
        discord_id: UserId,
        callsign: String,
        #[serde(default)]
        page: String,
    },
    #[serde(rename_all = "camelCase")]
    PresenceLeave {
        incident_id: IncidentId,
        patient_letter: PatientLetter,
        discord_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        incident_id: IncidentId,
        #[serde(default, deserialize_with = "de_opt_patient_letter")]
        patient_letter: Option<PatientLetter>,
        chat_type: ChatType,
        discord_id: UserId,
        callsign: String,
    },
}

/// `POST /api/realtime-event` — persist where applicable and broadcast.
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<RealtimeEventRequest>,
) -> ApiResult {
    match event {
        RealtimeEventRequest::CursorUpdate {
            incident_id,
            patient_letter,
            discord_id,
            callsign,
            field_name,
        } => {
            if let Err(err) = state
                .collab
                .presence()
                .focus_field(&incident_id, &patient_letter, &discord_id, &callsign, &field_name)
                .await
            {
                tracing::warn!(user = %discord_id, error = %err, "cursor update failed");
            }
            Ok(success(json!({})))
        }
        RealtimeEventRequest::CursorLeave {
            incident_id,
            patient_letter,
            discord_id,
        } => {
            if let Err(err) = state
                .collab
                .presence()
                .cursor_leave(&incident_id, &patient_letter, &discord_id)
                .await
            {
                tracing::warn!(user = %discord_id, error = %err, "cursor leave failed");
            }
            Ok(success(json!({})))
        }
        RealtimeEventRequest::ChatMessage {
            incident_id,
            patient_letter,
            chat_type,
            discord_id,
            callsign,
            text,
        } => {
            let message = state
                .collab
                .chat()
                .post_message(
                    &incident_id,
                    patient_letter.as_ref(),
                    chat_type,
                    &discord_id,
                    &callsign,
                    &text,
                )
                .await?;
            Ok(success(json!({ "message": message })))
        }
        RealtimeEventRequest::PresenceUpdate {
            incident_id,
            patient_letter,
            discord_id,
            callsign,
            page,
        } => {
            if let Err(err) = state
                .collab
                .presence()
                .heartbeat(&incident_id, &patient_letter, &discord_id, &callsign, &page)
                .await
            {
                tracing::warn!(user = %discord_id, error = %err, "presence heartbeat failed");
            }
            Ok(success(json!({})))
        }
        RealtimeEventRequest::PresenceLeave {
            incident_id,
            patient_letter,
            discord_id,
        } => {
            if let Err(err) = state
                .collab
                .presence()
                .leave(&incident_id, &patient_letter, &discord_id)
                .await
            {
                tracing::warn!(user = %discord_id, error = %err, "presence leave failed");
            }
            Ok(success(json!({})))
        }
        RealtimeEventRequest::Typing {
            incident_id,
            patient_letter,
            chat_type,
            discord_id,
            callsign,
        } => {
            state.collab.chat().typing(
                &incident_id,
                patient_letter.as_ref(),
                chat_type,
                &discord_id,
                &callsign,
            )?;
            Ok(success(json!({})))
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryQuery {
    pub incident_id: IncidentId,
    pub chat_type: ChatType,
    #[serde(default, deserialize_with = "de_opt_patient_letter")]
    pub patient_letter: Option<PatientLetter>,
}

/// `GET /api/realtime-event` — last 50 messages of one channel, oldest
/// first.  Advisory read: a store failure answers an empty list.
pub async fn chat_history(
    State(state): State<AppState>,
    Query(query): Query<ChatHistoryQuery>,
) -> ApiResult {
    let messages = match state
        .collab
        .chat()
        .history(&query.incident_id, query.chat_type, query.patient_letter.as_ref())
        .await
    {
        Ok(messages) => messages,
        Err(eprf_collab::CollabError::Validation(msg)) => {
            return Err(crate::error::ApiError::BadRequest(msg));
        }
        Err(err) => {
            tracing::warn!(incident = %query.incident_id, error = %err, "chat history unavailable");
            Vec::new()
        }
    };
    Ok(success(json!({
        "messages": messages,
        "limit": CHAT_HISTORY_LIMIT,
    })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub chat_type: ChatType,
    #[serde(default)]
    pub after_seq: u64,
    #[serde(default)]
    pub wait_ms: Option<u64>,
}

/// `GET /api/realtime-event/poll` — long-poll fallback.  Blocks until an
/// in-scope event newer than `afterSeq` arrives or the wait expires, then
/// returns the batch collected so far plus the hub's latest sequence number
/// for the next call.
pub async fn poll(State(state): State<AppState>, Query(query): Query<PollQuery>) -> ApiResult {
    let scope = EventScope {
        incident_id: query.incident_id.clone(),
        patient_letter: query.patient_letter.clone(),
        chat_type: query.chat_type,
        chat_patient: match query.chat_type {
            ChatType::Incident => None,
            ChatType::Patient => Some(query.patient_letter.clone()),
        },
    };
    let mut sub = state.collab.hub().subscribe(scope);

    let wait = Duration::from_millis(
        query
            .wait_ms
            .unwrap_or(POLL_DEFAULT_WAIT_MS)
            .min(POLL_MAX_WAIT_MS),
    );
    let deadline = Instant::now() + wait;

    let mut events = Vec::new();
    while events.len() < POLL_MAX_EVENTS {
        // Once something arrived, drain what is immediately available
        // instead of waiting out the full window.
        let remaining = if events.is_empty() {
            deadline.saturating_duration_since(Instant::now())
        } else {
            Duration::from_millis(10)
        };
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, sub.recv()).await {
            Ok(Some(envelope)) if envelope.seq > query.after_seq => {
                events.push(json!({ "seq": envelope.seq, "event": envelope.event }));
            }
            Ok(Some(_)) => continue,
            Ok(None) | Err(_) => break,
        }
    }

    Ok(success(json!({
        "events": events,
        "lastSeq": state.collab.hub().last_seq(),
    })))
}
