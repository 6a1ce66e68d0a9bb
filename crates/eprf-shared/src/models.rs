//! Domain model structs persisted in the server's SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase keys so
//! it can be handed directly to the browser client as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::SectionDocument;
use crate::types::{ChatType, IncidentId, IncidentStatus, PatientLetter, PermissionLevel, UserId};

// ---------------------------------------------------------------------------
// Incident record
// ---------------------------------------------------------------------------

/// One patient report within an incident.  The `(incident_id, patient_letter)`
/// pair is the primary key; an incident with three casualties has three
/// records sharing an `incident_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Incident this patient belongs to.
    pub incident_id: IncidentId,
    /// Which patient within the incident ("A", "B", ...).
    pub patient_letter: PatientLetter,
    /// Lifecycle status of this patient's report.
    pub status: IncidentStatus,
    /// Discord id of whoever created this patient record.
    pub author_id: UserId,
    /// Callsign of the author at creation time.
    pub author_callsign: String,
    /// Discord id of the incident owner.  The owner is tracked per incident
    /// (every patient row carries the same value) and holds implicit `owner`
    /// permission over all of its patients.
    pub owner_id: UserId,
    /// Callsign of the incident owner.
    pub owner_callsign: String,
    /// Fleet the incident was logged under, if any.
    pub fleet_id: Option<String>,
    /// When the patient record was created.
    pub created_at: DateTime<Utc>,
    /// Last time any section of this patient's form was saved.
    pub updated_at: DateTime<Utc>,
    /// When the report was marked complete, if it has been.
    pub submitted_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Collaborator grant
// ---------------------------------------------------------------------------

/// An explicit permission grant on an incident or on a single patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    /// Incident the grant applies to.
    pub incident_id: IncidentId,
    /// `None` for an incident-level grant covering every patient; `Some` for
    /// a grant scoped to one patient.
    pub patient_letter: Option<PatientLetter>,
    /// Discord id of the collaborator.
    pub discord_id: UserId,
    /// Callsign of the collaborator at grant time.
    pub callsign: String,
    /// Granted level.  Never `owner` — ownership is implicit from the
    /// incident record.
    pub permission: PermissionLevel,
    /// Discord id of whoever added the grant.
    pub added_by: UserId,
    /// When the grant was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// A user currently viewing a patient's form, refreshed by heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    /// Discord id of the viewer.
    pub discord_id: UserId,
    /// Callsign of the viewer.
    pub callsign: String,
    /// Incident being viewed.
    pub incident_id: IncidentId,
    /// Patient being viewed.
    pub patient_letter: PatientLetter,
    /// Which form page the viewer is on.
    pub page: String,
    /// Last heartbeat received.  Entries older than the staleness window are
    /// excluded from queries and eventually pruned.
    pub last_seen: DateTime<Utc>,
}

/// The form field a user currently has focused, for remote cursor display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CursorEntry {
    /// Discord id of the user.
    pub discord_id: UserId,
    /// Callsign of the user.
    pub callsign: String,
    /// Incident the cursor belongs to.
    pub incident_id: IncidentId,
    /// Patient the cursor belongs to.
    pub patient_letter: PatientLetter,
    /// Focused field name.  An empty string records a blur (no field focused).
    pub field_name: String,
    /// Display colour, derived from the discord id.
    pub color: String,
    /// Last focus change.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A persisted chat message in an incident-wide or per-patient channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message identifier.
    pub id: Uuid,
    /// Incident the channel belongs to.
    pub incident_id: IncidentId,
    /// Patient channel, or `None` for the incident-wide channel.
    pub patient_letter: Option<PatientLetter>,
    /// Which kind of channel this message was posted to.
    pub chat_type: ChatType,
    /// Discord id of the sender.
    pub sender_id: UserId,
    /// Callsign of the sender at send time.
    pub sender_callsign: String,
    /// Message body as typed, mentions included.
    pub text: String,
    /// Discord ids of mentioned roster members, in order of appearance and
    /// with duplicates preserved.
    pub mentions: Vec<UserId>,
    /// When the message was posted.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// A notification addressed to a single user (mention, share, transfer...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Unique notification identifier.
    pub id: Uuid,
    /// Discord id of the recipient.
    pub target_id: UserId,
    /// Machine-readable kind ("mention", "collaborator_added", ...).
    pub kind: String,
    /// Short title for the notification list.
    pub title: String,
    /// Body text, truncated to a preview where the source is long.
    pub message: String,
    /// Incident the notification refers to, if any.
    pub incident_id: Option<IncidentId>,
    /// Patient the notification refers to, if any.
    pub patient_letter: Option<PatientLetter>,
    /// Callsign of whoever triggered the notification.
    pub from_callsign: Option<String>,
    /// Client-side route to open when the notification is clicked.
    pub link: Option<String>,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// When the notification was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Version history
// ---------------------------------------------------------------------------

/// One entry in a section's version history: a snapshot pair plus the
/// field-level diff between them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    /// Unique version identifier.
    pub id: Uuid,
    /// Incident the section belongs to.
    pub incident_id: IncidentId,
    /// Patient the section belongs to.
    pub patient_letter: PatientLetter,
    /// Section of the form ("primary-survey", "vitals", ...).
    pub section_name: String,
    /// Discord id of whoever saved this version.
    pub changed_by: UserId,
    /// Callsign of whoever saved this version.
    pub changed_by_callsign: String,
    /// Full section document before the save.
    pub previous_data: SectionDocument,
    /// Full section document after the save.
    pub new_data: SectionDocument,
    /// Field-level diff between the two snapshots, or a restore marker.
    pub diff_data: serde_json::Value,
    /// Human-readable summary ("2 fields modified, 1 field added").
    pub change_summary: String,
    /// When the version was recorded.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Share links
// ---------------------------------------------------------------------------

/// An unguessable link token granting its bearer a permission level.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// Capability token; knowing it is the authorization.
    pub token: Uuid,
    /// Incident the link grants access to.
    pub incident_id: IncidentId,
    /// Patient scope, or `None` for the whole incident.
    pub patient_letter: Option<PatientLetter>,
    /// Level the link grants on redemption.
    pub permission: PermissionLevel,
    /// Discord id of whoever created the link.
    pub created_by: UserId,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A user who can be mentioned in a chat channel: the union of the owner,
/// authors, and collaborators of the scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    /// Discord id of the member.
    pub discord_id: UserId,
    /// Callsign the member is mentioned by.
    pub callsign: String,
}
