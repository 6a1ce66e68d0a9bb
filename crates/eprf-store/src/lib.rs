//! # eprf-store
//!
//! SQLite persistence for the ePRF collaboration backend.  The [`Store`]
//! handle wraps an async connection whose queries run on a dedicated worker
//! thread; it is cheap to clone and shared across concurrent request
//! handlers.  One CRUD module per entity keeps every write scoped to a
//! uniquely-keyed row, so concurrent writers to different rows never
//! conflict and same-row writers resolve last-write-wins.

pub mod chat;
pub mod collaborators;
pub mod database;
pub mod encode;
pub mod error;
pub mod incidents;
pub mod migrations;
pub mod notifications;
pub mod presence;
pub mod sections;
pub mod share_links;
pub mod versions;

pub use database::Store;
pub use error::{Result, StoreError};

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use eprf_shared::{
        ChatMessage, ChatType, Collaborator, CursorEntry, IncidentId, IncidentRecord,
        IncidentStatus, Notification, PatientLetter, PermissionLevel, PresenceEntry, UserId,
    };

    use crate::Store;

    fn incident_record(incident: &str, patient: &str, owner: &str) -> IncidentRecord {
        let now = Utc::now();
        IncidentRecord {
            incident_id: IncidentId::from(incident),
            patient_letter: PatientLetter::from(patient),
            status: IncidentStatus::Incomplete,
            author_id: UserId::from(owner),
            author_callsign: "Medic 1".to_string(),
            owner_id: UserId::from(owner),
            owner_callsign: "Medic 1".to_string(),
            fleet_id: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        }
    }

    #[tokio::test]
    async fn test_incident_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let record = incident_record("INC-1", "A", "100");

        store.insert_incident(&record).await.unwrap();

        let found = store
            .get_incident(&record.incident_id, &record.patient_letter)
            .await
            .unwrap();
        assert_eq!(found.owner_id, record.owner_id);
        assert_eq!(found.status, IncidentStatus::Incomplete);
        assert!(found.submitted_at.is_none());

        let owner = store.incident_owner(&record.incident_id).await.unwrap();
        assert_eq!(owner, Some((UserId::from("100"), "Medic 1".to_string())));
    }

    #[tokio::test]
    async fn test_collaborator_scopes_are_independent() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("B");
        let user = UserId::from("200");

        store
            .upsert_collaborator(&Collaborator {
                incident_id: incident.clone(),
                patient_letter: Some(patient.clone()),
                discord_id: user.clone(),
                callsign: "Rescue 4".to_string(),
                permission: PermissionLevel::Edit,
                added_by: UserId::from("100"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Patient-level grant does not appear at incident level.
        let incident_grant = store
            .find_collaborator(&incident, None, &user)
            .await
            .unwrap();
        assert!(incident_grant.is_none());

        let patient_grant = store
            .find_collaborator(&incident, Some(&patient), &user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(patient_grant.permission, PermissionLevel::Edit);
    }

    #[tokio::test]
    async fn test_roster_dedupes_by_id() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");

        store
            .insert_incident(&incident_record("INC-1", "A", "100"))
            .await
            .unwrap();
        // Owner also appears as an incident-level collaborator row elsewhere;
        // the roster must still list them once.
        store
            .upsert_collaborator(&Collaborator {
                incident_id: incident.clone(),
                patient_letter: None,
                discord_id: UserId::from("200"),
                callsign: "Rescue 4".to_string(),
                permission: PermissionLevel::View,
                added_by: UserId::from("100"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let roster = store.roster(&incident).await.unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster[0].discord_id, UserId::from("100"));
        assert_eq!(roster[1].discord_id, UserId::from("200"));
    }

    #[tokio::test]
    async fn test_presence_staleness_cutoff() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        let fresh = PresenceEntry {
            incident_id: incident.clone(),
            patient_letter: patient.clone(),
            discord_id: UserId::from("100"),
            callsign: "Medic 1".to_string(),
            page: "vitals".to_string(),
            last_seen: Utc::now(),
        };
        let stale = PresenceEntry {
            discord_id: UserId::from("200"),
            last_seen: Utc::now() - Duration::seconds(60),
            ..fresh.clone()
        };

        store.upsert_presence(&fresh).await.unwrap();
        store.upsert_presence(&stale).await.unwrap();

        let cutoff = Utc::now() - Duration::seconds(15);
        let active = store
            .active_presence(&incident, &patient, cutoff)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].discord_id, UserId::from("100"));

        let pruned = store.prune_presence(cutoff).await.unwrap();
        assert_eq!(pruned, 1);
    }

    #[tokio::test]
    async fn test_blurred_cursor_is_hidden() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        let mut cursor = CursorEntry {
            incident_id: incident.clone(),
            patient_letter: patient.clone(),
            discord_id: UserId::from("100"),
            callsign: "Medic 1".to_string(),
            field_name: "pulse".to_string(),
            color: "#e6194b".to_string(),
            updated_at: Utc::now(),
        };
        store.upsert_cursor(&cursor).await.unwrap();

        let cutoff = Utc::now() - Duration::seconds(5);
        assert_eq!(
            store
                .active_cursors(&incident, &patient, cutoff)
                .await
                .unwrap()
                .len(),
            1
        );

        // Blur writes an empty field name; the cursor disappears from reads.
        cursor.field_name = String::new();
        cursor.updated_at = Utc::now();
        store.upsert_cursor(&cursor).await.unwrap();
        assert!(store
            .active_cursors(&incident, &patient, cutoff)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_chat_scope_isolation_in_store() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");

        let base = ChatMessage {
            id: Uuid::new_v4(),
            incident_id: incident.clone(),
            patient_letter: None,
            chat_type: ChatType::Incident,
            sender_id: UserId::from("100"),
            sender_callsign: "Medic 1".to_string(),
            text: "incident-wide".to_string(),
            mentions: vec![],
            created_at: Utc::now(),
        };
        store.insert_chat_message(&base).await.unwrap();
        store
            .insert_chat_message(&ChatMessage {
                id: Uuid::new_v4(),
                patient_letter: Some(PatientLetter::from("B")),
                chat_type: ChatType::Patient,
                text: "patient B only".to_string(),
                ..base.clone()
            })
            .await
            .unwrap();

        let incident_chat = store
            .chat_history(&incident, ChatType::Incident, None, 50)
            .await
            .unwrap();
        assert_eq!(incident_chat.len(), 1);
        assert_eq!(incident_chat[0].text, "incident-wide");

        let patient_chat = store
            .chat_history(
                &incident,
                ChatType::Patient,
                Some(&PatientLetter::from("B")),
                50,
            )
            .await
            .unwrap();
        assert_eq!(patient_chat.len(), 1);
        assert_eq!(patient_chat[0].text, "patient B only");

        // Patient A's channel sees neither.
        assert!(store
            .chat_history(
                &incident,
                ChatType::Patient,
                Some(&PatientLetter::from("A")),
                50,
            )
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_chat_history_limit_and_order() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");
        let start = Utc::now();

        for n in 0..60 {
            store
                .insert_chat_message(&ChatMessage {
                    id: Uuid::new_v4(),
                    incident_id: incident.clone(),
                    patient_letter: None,
                    chat_type: ChatType::Incident,
                    sender_id: UserId::from("100"),
                    sender_callsign: "Medic 1".to_string(),
                    text: format!("message {n}"),
                    mentions: vec![],
                    created_at: start + Duration::milliseconds(n),
                })
                .await
                .unwrap();
        }

        let history = store
            .chat_history(&incident, ChatType::Incident, None, 50)
            .await
            .unwrap();
        assert_eq!(history.len(), 50);
        // Oldest of the retained window first, newest last.
        assert_eq!(history[0].text, "message 10");
        assert_eq!(history[49].text, "message 59");
    }

    #[tokio::test]
    async fn test_notification_read_transitions() {
        let store = Store::open_in_memory().await.unwrap();
        let target = UserId::from("300");

        let mut ids = Vec::new();
        for n in 0..3 {
            let notification = Notification {
                id: Uuid::new_v4(),
                target_id: target.clone(),
                kind: "mention".to_string(),
                title: "You were mentioned".to_string(),
                message: format!("ping {n}"),
                incident_id: Some(IncidentId::from("INC-1")),
                patient_letter: None,
                from_callsign: Some("Medic 1".to_string()),
                link: None,
                is_read: false,
                created_at: Utc::now() + Duration::milliseconds(n),
            };
            store.insert_notification(&notification).await.unwrap();
            ids.push(notification.id);
        }

        assert_eq!(store.unread_notification_count(&target).await.unwrap(), 3);

        assert!(store
            .mark_notification_read(ids[0], &target)
            .await
            .unwrap());
        assert_eq!(store.unread_notification_count(&target).await.unwrap(), 2);

        // Wrong target cannot flip someone else's row.
        assert!(!store
            .mark_notification_read(ids[1], &UserId::from("999"))
            .await
            .unwrap());

        assert_eq!(
            store.mark_all_notifications_read(&target).await.unwrap(),
            2
        );
        assert_eq!(store.delete_read_notifications(&target).await.unwrap(), 3);
        assert!(store
            .list_notifications(&target, false, 50)
            .await
            .unwrap()
            .is_empty());
    }
}
