//! Presence and cursor tracking.
//!
//! Everything here is advisory: heartbeats and focus changes are idempotent
//! upserts keyed by `(incident, patient, user)`, reads exclude rows past the
//! staleness window even when a leave event was lost, and a periodic sweep
//! deletes expired rows.  The tracker broadcasts every change through the
//! hub so peers update without polling.

use std::sync::Arc;

use chrono::{Duration, Utc};

use eprf_shared::color::cursor_color;
use eprf_shared::constants::{CURSOR_STALE_SECS, PRESENCE_STALE_SECS};
use eprf_shared::events::{CursorLeave, CursorUpdate, PresenceLeave, PresenceUpdate};
use eprf_shared::{CursorEntry, IncidentId, LiveEvent, PatientLetter, PresenceEntry, UserId};
use eprf_store::Store;

use crate::error::Result;
use crate::hub::EventHub;

#[derive(Clone)]
pub struct PresenceTracker {
    store: Store,
    hub: Arc<EventHub>,
}

impl PresenceTracker {
    pub fn new(store: Store, hub: Arc<EventHub>) -> Self {
        Self { store, hub }
    }

    /// Record that `user` is (still) viewing the patient's form.  The first
    /// heartbeat makes them appear; each later one refreshes `last_seen`.
    pub async fn heartbeat(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
        callsign: &str,
        page: &str,
    ) -> Result<()> {
        let entry = PresenceEntry {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.clone(),
            discord_id: user.clone(),
            callsign: callsign.to_string(),
            page: page.to_string(),
            last_seen: Utc::now(),
        };
        self.store.upsert_presence(&entry).await?;
        self.hub.publish(LiveEvent::PresenceUpdate(PresenceUpdate {
            incident_id: entry.incident_id,
            patient_letter: entry.patient_letter,
            discord_id: entry.discord_id,
            callsign: entry.callsign,
            page: entry.page,
            last_seen: entry.last_seen,
        }));
        Ok(())
    }

    /// Drop the user's cursor row and tell peers, without touching their
    /// presence.  Idempotent.
    pub async fn cursor_leave(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<()> {
        if self
            .store
            .remove_cursor(incident_id, patient_letter, user)
            .await?
        {
            self.hub.publish(LiveEvent::CursorLeave(CursorLeave {
                incident_id: incident_id.clone(),
                patient_letter: patient_letter.clone(),
                discord_id: user.clone(),
            }));
        }
        Ok(())
    }

    /// Explicit leave: drop both the presence row and any cursor row, and
    /// tell peers.  Idempotent — leaving twice is not an error.
    pub async fn leave(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<()> {
        self.cursor_leave(incident_id, patient_letter, user).await?;
        self.store
            .remove_presence(incident_id, patient_letter, user)
            .await?;
        self.hub.publish(LiveEvent::PresenceLeave(PresenceLeave {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.clone(),
            discord_id: user.clone(),
        }));
        Ok(())
    }

    /// Record that `user` focused a form field.  An empty `field_name`
    /// records a blur, which peers render as "no indicator".
    pub async fn focus_field(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
        callsign: &str,
        field_name: &str,
    ) -> Result<()> {
        let entry = CursorEntry {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.clone(),
            discord_id: user.clone(),
            callsign: callsign.to_string(),
            field_name: field_name.to_string(),
            // Always derived server-side; both ends hash to the same colour.
            color: cursor_color(user).to_string(),
            updated_at: Utc::now(),
        };
        self.store.upsert_cursor(&entry).await?;
        self.hub.publish(LiveEvent::CursorUpdate(CursorUpdate {
            incident_id: entry.incident_id,
            patient_letter: entry.patient_letter,
            discord_id: entry.discord_id,
            callsign: entry.callsign,
            field_name: entry.field_name,
            color: entry.color,
        }));
        Ok(())
    }

    /// Blur without leaving the form.
    pub async fn blur_field(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
        callsign: &str,
    ) -> Result<()> {
        self.focus_field(incident_id, patient_letter, user, callsign, "")
            .await
    }

    /// Who is viewing the patient right now (heartbeat within the presence
    /// staleness window).
    pub async fn viewers(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<Vec<PresenceEntry>> {
        let cutoff = Utc::now() - Duration::seconds(PRESENCE_STALE_SECS);
        Ok(self
            .store
            .active_presence(incident_id, patient_letter, cutoff)
            .await?)
    }

    /// Focused-field indicators to render (updated within the cursor
    /// staleness window, blurs excluded).
    pub async fn cursors(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<Vec<CursorEntry>> {
        let cutoff = Utc::now() - Duration::seconds(CURSOR_STALE_SECS);
        Ok(self
            .store
            .active_cursors(incident_id, patient_letter, cutoff)
            .await?)
    }

    /// Delete rows past their staleness windows.  Run periodically; bounds
    /// the leak from sessions that never called leave.
    pub async fn sweep(&self) -> Result<(usize, usize)> {
        let now = Utc::now();
        let presence = self
            .store
            .prune_presence(now - Duration::seconds(PRESENCE_STALE_SECS))
            .await?;
        let cursors = self
            .store
            .prune_cursors(now - Duration::seconds(CURSOR_STALE_SECS))
            .await?;
        if presence > 0 || cursors > 0 {
            tracing::debug!(presence, cursors, "swept stale presence rows");
        }
        Ok((presence, cursors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(store: Store) -> PresenceTracker {
        PresenceTracker::new(store, Arc::new(EventHub::default()))
    }

    #[tokio::test]
    async fn test_heartbeat_then_leave() {
        let store = Store::open_in_memory().await.unwrap();
        let tracker = tracker(store);
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");
        let user = UserId::from("100");

        tracker
            .heartbeat(&incident, &patient, &user, "Medic 1", "vitals")
            .await
            .unwrap();
        let viewers = tracker.viewers(&incident, &patient).await.unwrap();
        assert_eq!(viewers.len(), 1);
        assert_eq!(viewers[0].page, "vitals");

        tracker.leave(&incident, &patient, &user).await.unwrap();
        assert!(tracker.viewers(&incident, &patient).await.unwrap().is_empty());

        // Leaving again is a no-op, not an error.
        tracker.leave(&incident, &patient, &user).await.unwrap();
    }

    #[tokio::test]
    async fn test_focus_blur_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let tracker = tracker(store);
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");
        let user = UserId::from("100");

        tracker
            .focus_field(&incident, &patient, &user, "Medic 1", "pulse")
            .await
            .unwrap();
        let cursors = tracker.cursors(&incident, &patient).await.unwrap();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].field_name, "pulse");
        assert_eq!(cursors[0].color, cursor_color(&user));

        // Refocusing replaces, never duplicates: one field per user.
        tracker
            .focus_field(&incident, &patient, &user, "Medic 1", "bp")
            .await
            .unwrap();
        let cursors = tracker.cursors(&incident, &patient).await.unwrap();
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].field_name, "bp");

        tracker
            .blur_field(&incident, &patient, &user, "Medic 1")
            .await
            .unwrap();
        assert!(tracker.cursors(&incident, &patient).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_broadcasts() {
        let store = Store::open_in_memory().await.unwrap();
        let hub = Arc::new(EventHub::default());
        let tracker = PresenceTracker::new(store, hub.clone());
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        let mut sub = hub.subscribe(crate::hub::EventScope {
            incident_id: incident.clone(),
            patient_letter: patient.clone(),
            chat_type: eprf_shared::ChatType::Incident,
            chat_patient: None,
        });

        tracker
            .heartbeat(&incident, &patient, &UserId::from("100"), "Medic 1", "vitals")
            .await
            .unwrap();

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.event.kind(), "presence-update");
    }
}
