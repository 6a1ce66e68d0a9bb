//! Collaboration entry points.
//!
//! [`Collab`] wires the store, the event hub, and every engine together and
//! is what the server embeds.  [`Collab::join`] opens a [`CollabSession`] on
//! one patient form: a convenience handle that carries the caller's identity
//! and a permission snapshot, throttles typing pings, and tears presence
//! down when dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use eprf_shared::constants::TYPING_THROTTLE_SECS;
use eprf_shared::{
    ChatMessage, ChatType, CursorEntry, IncidentId, PatientLetter, PermissionLevel, PresenceEntry,
    SectionDocument, UserId, VersionEntry,
};
use eprf_store::Store;

use crate::access::AccessControl;
use crate::chat::ChatService;
use crate::error::Result;
use crate::history::HistoryEngine;
use crate::hub::{EventHub, EventScope, EventSubscription};
use crate::notify::NotificationService;
use crate::presence::PresenceTracker;
use crate::records::RecordsService;
use crate::sharing::SharingService;

/// The collaboration backend: one per process, cheap to clone.
#[derive(Clone)]
pub struct Collab {
    store: Store,
    hub: Arc<EventHub>,
    access: AccessControl,
    records: RecordsService,
    sharing: SharingService,
    history: HistoryEngine,
    chat: ChatService,
    presence: PresenceTracker,
    notifications: NotificationService,
}

impl Collab {
    pub fn new(store: Store, admin_ids: impl IntoIterator<Item = UserId>) -> Self {
        let hub = Arc::new(EventHub::default());
        let access = AccessControl::new(store.clone(), admin_ids);
        let notifications = NotificationService::new(store.clone());
        Self {
            records: RecordsService::new(store.clone(), access.clone(), notifications.clone()),
            sharing: SharingService::new(store.clone(), access.clone(), notifications.clone()),
            history: HistoryEngine::new(store.clone(), access.clone()),
            chat: ChatService::new(store.clone(), hub.clone(), notifications.clone()),
            presence: PresenceTracker::new(store.clone(), hub.clone()),
            notifications,
            access,
            hub,
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn records(&self) -> &RecordsService {
        &self.records
    }

    pub fn sharing(&self) -> &SharingService {
        &self.sharing
    }

    pub fn history(&self) -> &HistoryEngine {
        &self.history
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    /// Open a session on one patient form.  Resolves the caller's effective
    /// permission once (fail-closed) and announces their presence.
    pub async fn join(
        &self,
        incident_id: IncidentId,
        patient_letter: PatientLetter,
        user: UserId,
        callsign: String,
    ) -> Result<CollabSession> {
        let permission = self
            .access
            .resolve_access(&incident_id, &patient_letter, &user)
            .await;

        let session = CollabSession {
            collab: self.clone(),
            incident_id,
            patient_letter,
            user,
            callsign,
            permission,
            last_typing: None,
            left: false,
        };
        session.heartbeat("form").await;
        Ok(session)
    }
}

/// One user's live session on one patient form.
///
/// The permission field is a snapshot taken at join time; mutation paths
/// re-check against the store, so a revoked grant stops writes even while a
/// stale session is open.
pub struct CollabSession {
    collab: Collab,
    incident_id: IncidentId,
    patient_letter: PatientLetter,
    user: UserId,
    callsign: String,
    permission: PermissionLevel,
    last_typing: Option<Instant>,
    left: bool,
}

impl CollabSession {
    pub fn incident_id(&self) -> &IncidentId {
        &self.incident_id
    }

    pub fn patient_letter(&self) -> &PatientLetter {
        &self.patient_letter
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn permission(&self) -> PermissionLevel {
        self.permission
    }

    /// Subscribe to this form's live events, with chat narrowed to one
    /// channel.
    pub fn events(&self, chat_type: ChatType) -> EventSubscription {
        self.collab.hub.subscribe(EventScope {
            incident_id: self.incident_id.clone(),
            patient_letter: self.patient_letter.clone(),
            chat_type,
            chat_patient: match chat_type {
                ChatType::Incident => None,
                ChatType::Patient => Some(self.patient_letter.clone()),
            },
        })
    }

    /// Refresh presence.  Advisory: a store failure is logged, never
    /// surfaced, so a flaky disk cannot break the form.
    pub async fn heartbeat(&self, page: &str) {
        if let Err(err) = self
            .collab
            .presence
            .heartbeat(
                &self.incident_id,
                &self.patient_letter,
                &self.user,
                &self.callsign,
                page,
            )
            .await
        {
            tracing::warn!(user = %self.user, error = %err, "presence heartbeat failed");
        }
    }

    /// Advisory, like [`CollabSession::heartbeat`].
    pub async fn focus_field(&self, field_name: &str) {
        if let Err(err) = self
            .collab
            .presence
            .focus_field(
                &self.incident_id,
                &self.patient_letter,
                &self.user,
                &self.callsign,
                field_name,
            )
            .await
        {
            tracing::warn!(user = %self.user, error = %err, "cursor update failed");
        }
    }

    pub async fn blur_field(&self) {
        self.focus_field("").await;
    }

    pub async fn viewers(&self) -> Result<Vec<PresenceEntry>> {
        self.collab
            .presence
            .viewers(&self.incident_id, &self.patient_letter)
            .await
    }

    pub async fn cursors(&self) -> Result<Vec<CursorEntry>> {
        self.collab
            .presence
            .cursors(&self.incident_id, &self.patient_letter)
            .await
    }

    /// Broadcast a typing ping, rate-limited to one per throttle window.
    /// Returns whether a ping was actually sent.
    pub fn send_typing(&mut self, chat_type: ChatType) -> Result<bool> {
        let now = Instant::now();
        if let Some(last) = self.last_typing {
            if now.duration_since(last) < Duration::from_secs(TYPING_THROTTLE_SECS) {
                return Ok(false);
            }
        }
        self.last_typing = Some(now);
        self.collab.chat.typing(
            &self.incident_id,
            self.chat_patient(chat_type).as_ref(),
            chat_type,
            &self.user,
            &self.callsign,
        )?;
        Ok(true)
    }

    pub async fn send_message(&self, chat_type: ChatType, text: &str) -> Result<ChatMessage> {
        self.collab
            .chat
            .post_message(
                &self.incident_id,
                self.chat_patient(chat_type).as_ref(),
                chat_type,
                &self.user,
                &self.callsign,
                text,
            )
            .await
    }

    pub async fn chat_history(&self, chat_type: ChatType) -> Result<Vec<ChatMessage>> {
        self.collab
            .chat
            .history(
                &self.incident_id,
                chat_type,
                self.chat_patient(chat_type).as_ref(),
            )
            .await
    }

    /// Save one form section: authorize, persist the new snapshot
    /// (last-write-wins), and record a version entry against the previous
    /// snapshot.  Returns the entry, or `None` when nothing changed.
    pub async fn save_section(
        &self,
        section_name: &str,
        data: &SectionDocument,
        summary: Option<String>,
    ) -> Result<Option<VersionEntry>> {
        self.collab
            .access
            .require_editor(&self.incident_id, &self.patient_letter, &self.user)
            .await?;

        let previous = self
            .collab
            .store
            .get_section(&self.incident_id, &self.patient_letter, section_name)
            .await?
            .unwrap_or_default();

        self.collab
            .store
            .upsert_section(&self.incident_id, &self.patient_letter, section_name, data)
            .await?;
        self.collab
            .store
            .touch_incident(&self.incident_id, &self.patient_letter)
            .await?;

        self.collab
            .history
            .record_version(
                &self.incident_id,
                &self.patient_letter,
                section_name,
                &self.user,
                &self.callsign,
                &previous,
                data,
                summary,
            )
            .await
    }

    /// Version history of this patient, newest first.
    pub async fn history(
        &self,
        section_name: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VersionEntry>> {
        self.collab
            .history
            .list_history(
                &self.incident_id,
                Some(&self.patient_letter),
                section_name,
                limit,
            )
            .await
    }

    /// Undo the change a version entry recorded.
    pub async fn restore(&self, version_id: Uuid) -> Result<SectionDocument> {
        self.collab
            .history
            .restore(&self.incident_id, version_id, &self.user, &self.callsign)
            .await
    }

    pub async fn section(&self, section_name: &str) -> Result<Option<SectionDocument>> {
        Ok(self
            .collab
            .store
            .get_section(&self.incident_id, &self.patient_letter, section_name)
            .await?)
    }

    /// Leave the form: clear presence and cursor and notify peers.
    /// Idempotent; also triggered by dropping the session.
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        if let Err(err) = self
            .collab
            .presence
            .leave(&self.incident_id, &self.patient_letter, &self.user)
            .await
        {
            tracing::warn!(user = %self.user, error = %err, "presence leave failed");
        }
    }

    fn chat_patient(&self, chat_type: ChatType) -> Option<PatientLetter> {
        match chat_type {
            ChatType::Incident => None,
            ChatType::Patient => Some(self.patient_letter.clone()),
        }
    }
}

impl Drop for CollabSession {
    fn drop(&mut self) {
        if self.left {
            return;
        }
        // Best-effort: peers still expire the presence row on staleness if
        // no runtime is available to run the leave.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let presence = self.collab.presence.clone();
            let incident_id = self.incident_id.clone();
            let patient_letter = self.patient_letter.clone();
            let user = self.user.clone();
            handle.spawn(async move {
                let _ = presence.leave(&incident_id, &patient_letter, &user).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use eprf_shared::{IncidentRecord, IncidentStatus};

    use super::*;

    fn doc(value: serde_json::Value) -> SectionDocument {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    async fn collab_with_incident() -> Collab {
        let store = Store::open_in_memory().await.unwrap();
        let now = Utc::now();
        store
            .insert_incident(&IncidentRecord {
                incident_id: IncidentId::from("INC-1"),
                patient_letter: PatientLetter::from("A"),
                status: IncidentStatus::Incomplete,
                author_id: UserId::from("100"),
                author_callsign: "Medic 1".to_string(),
                owner_id: UserId::from("100"),
                owner_callsign: "Medic 1".to_string(),
                fleet_id: None,
                created_at: now,
                updated_at: now,
                submitted_at: None,
            })
            .await
            .unwrap();
        Collab::new(store, [])
    }

    #[tokio::test]
    async fn test_join_snapshots_permission_and_announces() {
        let collab = collab_with_incident().await;

        let mut session = collab
            .join(
                IncidentId::from("INC-1"),
                PatientLetter::from("A"),
                UserId::from("100"),
                "Medic 1".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(session.permission(), PermissionLevel::Owner);

        let viewers = session.viewers().await.unwrap();
        assert_eq!(viewers.len(), 1);
        assert_eq!(viewers[0].discord_id, UserId::from("100"));

        // A stranger joins read-only but is still visible to peers.
        let mut other = collab
            .join(
                IncidentId::from("INC-1"),
                PatientLetter::from("A"),
                UserId::from("999"),
                "Bystander".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(other.permission(), PermissionLevel::View);
        assert_eq!(session.viewers().await.unwrap().len(), 2);

        other.leave().await;
        assert_eq!(session.viewers().await.unwrap().len(), 1);
        session.leave().await;
    }

    #[tokio::test]
    async fn test_save_section_records_version() {
        let collab = collab_with_incident().await;
        let mut session = collab
            .join(
                IncidentId::from("INC-1"),
                PatientLetter::from("A"),
                UserId::from("100"),
                "Medic 1".to_string(),
            )
            .await
            .unwrap();

        let vitals = doc(json!({"hr": 80}));
        let entry = session
            .save_section("vitals", &vitals, None)
            .await
            .unwrap()
            .unwrap();
        assert!(entry.previous_data.is_empty());
        assert_eq!(entry.new_data, vitals);

        assert_eq!(session.section("vitals").await.unwrap(), Some(vitals.clone()));

        // Saving the identical snapshot writes no version entry.
        assert!(session.save_section("vitals", &vitals, None).await.unwrap().is_none());

        // A real change appends, and restoring it brings the old data back.
        let updated = doc(json!({"hr": 95}));
        session.save_section("vitals", &updated, None).await.unwrap().unwrap();
        let history = session.history(Some("vitals"), None).await.unwrap();
        assert_eq!(history.len(), 2);

        let restored = session.restore(history[0].id).await.unwrap();
        assert_eq!(restored, vitals);
        assert_eq!(session.section("vitals").await.unwrap(), Some(vitals));
        session.leave().await;
    }

    #[tokio::test]
    async fn test_view_session_cannot_save() {
        let collab = collab_with_incident().await;
        let mut session = collab
            .join(
                IncidentId::from("INC-1"),
                PatientLetter::from("A"),
                UserId::from("999"),
                "Bystander".to_string(),
            )
            .await
            .unwrap();

        let err = session.save_section("vitals", &doc(json!({"hr": 80})), None).await;
        assert!(matches!(err, Err(crate::error::CollabError::Authorization(_))));
        session.leave().await;
    }

    #[tokio::test]
    async fn test_typing_is_throttled() {
        let collab = collab_with_incident().await;
        let mut session = collab
            .join(
                IncidentId::from("INC-1"),
                PatientLetter::from("A"),
                UserId::from("100"),
                "Medic 1".to_string(),
            )
            .await
            .unwrap();

        assert!(session.send_typing(ChatType::Incident).unwrap());
        assert!(!session.send_typing(ChatType::Incident).unwrap());
        session.leave().await;
    }
}
