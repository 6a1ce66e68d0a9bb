use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;
use crate::types::{ChatType, IncidentId, PatientLetter, UserId};

/// All live collaboration events fanned out to connected clients.
///
/// Serialized as JSON with a `type` tag so the browser can dispatch on it
/// directly (`{"type": "cursor-update", ...}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LiveEvent {
    /// A user focused a form field (or moved focus to a new one).
    CursorUpdate(CursorUpdate),

    /// A user blurred out of a field or left the form.
    CursorLeave(CursorLeave),

    /// A chat message was posted to an incident or patient channel.
    ChatMessage(ChatMessage),

    /// A user's presence heartbeat (joined or still viewing).
    PresenceUpdate(PresenceUpdate),

    /// A user left the form.
    PresenceLeave(PresenceLeave),

    /// A user is typing in a chat channel.  Ephemeral, never persisted.
    Typing(TypingPing),
}

impl LiveEvent {
    /// Incident the event belongs to, for fan-out filtering.
    pub fn incident_id(&self) -> &IncidentId {
        match self {
            Self::CursorUpdate(e) => &e.incident_id,
            Self::CursorLeave(e) => &e.incident_id,
            Self::ChatMessage(e) => &e.incident_id,
            Self::PresenceUpdate(e) => &e.incident_id,
            Self::PresenceLeave(e) => &e.incident_id,
            Self::Typing(e) => &e.incident_id,
        }
    }

    /// Patient scope of the event, where it has one.
    pub fn patient_letter(&self) -> Option<&PatientLetter> {
        match self {
            Self::CursorUpdate(e) => Some(&e.patient_letter),
            Self::CursorLeave(e) => Some(&e.patient_letter),
            Self::ChatMessage(e) => e.patient_letter.as_ref(),
            Self::PresenceUpdate(e) => Some(&e.patient_letter),
            Self::PresenceLeave(e) => Some(&e.patient_letter),
            Self::Typing(e) => e.patient_letter.as_ref(),
        }
    }

    /// The wire tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CursorUpdate(_) => "cursor-update",
            Self::CursorLeave(_) => "cursor-leave",
            Self::ChatMessage(_) => "chat-message",
            Self::PresenceUpdate(_) => "presence-update",
            Self::PresenceLeave(_) => "presence-leave",
            Self::Typing(_) => "typing",
        }
    }
}

/// A user focused a form field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorUpdate {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
    pub callsign: String,
    /// Focused field, or empty when the user blurred without leaving.
    pub field_name: String,
    /// Display colour derived from the discord id.
    pub color: String,
}

/// A user's cursor left the form entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorLeave {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
}

/// A user joined or refreshed their presence on a patient form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
    pub callsign: String,
    /// Which form page the user is on.
    pub page: String,
    pub last_seen: DateTime<Utc>,
}

/// A user left a patient form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceLeave {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub discord_id: UserId,
}

/// A user is typing in a chat channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPing {
    pub incident_id: IncidentId,
    pub patient_letter: Option<PatientLetter>,
    pub chat_type: ChatType,
    pub discord_id: UserId,
    pub callsign: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_tag() {
        let event = LiveEvent::CursorLeave(CursorLeave {
            incident_id: IncidentId::from("INC-100"),
            patient_letter: PatientLetter::from("A"),
            discord_id: UserId::from("111"),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cursor-leave");
        assert_eq!(json["incidentId"], "INC-100");
        assert_eq!(json["patientLetter"], "A");

        let back: LiveEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), "cursor-leave");
    }

    #[test]
    fn test_event_scope_accessors() {
        let event = LiveEvent::Typing(TypingPing {
            incident_id: IncidentId::from("INC-7"),
            patient_letter: None,
            chat_type: ChatType::Incident,
            discord_id: UserId::from("222"),
            callsign: "Rescue 2".to_string(),
        });

        assert_eq!(event.incident_id().as_str(), "INC-7");
        assert!(event.patient_letter().is_none());
    }
}
