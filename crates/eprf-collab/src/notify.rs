//! Notification service.
//!
//! Thin layer over the store's notification table, plus the builders used by
//! other engines to raise notifications as side effects (mention in chat,
//! collaborator added, ownership or patient transfer).  Side-effect
//! notifications are best-effort: the triggering mutation has already
//! succeeded, so a failure here is logged and swallowed rather than failing
//! the request.

use chrono::Utc;
use uuid::Uuid;

use eprf_shared::{Collaborator, IncidentId, Notification, PatientLetter, UserId};
use eprf_store::Store;

use crate::error::{CollabError, Result};

#[derive(Clone)]
pub struct NotificationService {
    store: Store,
}

/// Notifications plus the recipient's unread total, as the client shows them.
#[derive(Debug, Clone)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

impl NotificationService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create an explicit notification (the `POST notifications` surface).
    pub async fn create(
        &self,
        target: &UserId,
        kind: &str,
        title: &str,
        message: &str,
        incident_id: Option<&IncidentId>,
        patient_letter: Option<&PatientLetter>,
        from_callsign: Option<&str>,
        link: Option<&str>,
    ) -> Result<Notification> {
        if target.as_str().is_empty() || kind.is_empty() || message.is_empty() {
            return Err(CollabError::Validation(
                "targetDiscordId, type, and message are required".to_string(),
            ));
        }

        let notification = Notification {
            id: Uuid::new_v4(),
            target_id: target.clone(),
            kind: kind.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            incident_id: incident_id.cloned(),
            patient_letter: patient_letter.cloned(),
            from_callsign: from_callsign.map(str::to_string),
            link: link.map(str::to_string),
            is_read: false,
            created_at: Utc::now(),
        };
        self.store.insert_notification(&notification).await?;
        Ok(notification)
    }

    pub async fn list(
        &self,
        target: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<NotificationList> {
        let notifications = self
            .store
            .list_notifications(target, unread_only, limit)
            .await?;
        let unread_count = self.store.unread_notification_count(target).await?;
        Ok(NotificationList {
            notifications,
            unread_count,
        })
    }

    pub async fn mark_read(&self, id: Uuid, target: &UserId) -> Result<()> {
        if self.store.mark_notification_read(id, target).await? {
            Ok(())
        } else {
            Err(CollabError::NotFound(format!("notification {id}")))
        }
    }

    pub async fn mark_all_read(&self, target: &UserId) -> Result<usize> {
        Ok(self.store.mark_all_notifications_read(target).await?)
    }

    pub async fn mark_many_read(&self, ids: &[Uuid], target: &UserId) -> Result<usize> {
        Ok(self.store.mark_notifications_read(ids, target).await?)
    }

    pub async fn delete_one(&self, id: Uuid, target: &UserId) -> Result<()> {
        if self.store.delete_notification(id, target).await? {
            Ok(())
        } else {
            Err(CollabError::NotFound(format!("notification {id}")))
        }
    }

    pub async fn clear_read(&self, target: &UserId) -> Result<usize> {
        Ok(self.store.delete_read_notifications(target).await?)
    }

    pub async fn clear_all(&self, target: &UserId) -> Result<usize> {
        Ok(self.store.delete_all_notifications(target).await?)
    }

    // -----------------------------------------------------------------------
    // Side-effect builders
    // -----------------------------------------------------------------------

    /// Raise a mention notification.  `preview` is already truncated by the
    /// chat service.
    pub(crate) async fn notify_mention(
        &self,
        target: &UserId,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        from_callsign: &str,
        preview: &str,
    ) {
        self.fire(Notification {
            id: Uuid::new_v4(),
            target_id: target.clone(),
            kind: "mention".to_string(),
            title: format!("{from_callsign} mentioned you"),
            message: preview.to_string(),
            incident_id: Some(incident_id.clone()),
            patient_letter: patient_letter.cloned(),
            from_callsign: Some(from_callsign.to_string()),
            link: Some(record_link(incident_id, patient_letter)),
            is_read: false,
            created_at: Utc::now(),
        })
        .await;
    }

    pub(crate) async fn notify_collaborator_added(
        &self,
        grant: &Collaborator,
        from_callsign: &str,
    ) {
        let scope = match &grant.patient_letter {
            Some(patient) => format!("patient {patient} of incident {}", grant.incident_id),
            None => format!("incident {}", grant.incident_id),
        };
        self.fire(Notification {
            id: Uuid::new_v4(),
            target_id: grant.discord_id.clone(),
            kind: "collaborator_added".to_string(),
            title: "You were added to a record".to_string(),
            message: format!("{from_callsign} gave you {} access to {scope}", grant.permission),
            incident_id: Some(grant.incident_id.clone()),
            patient_letter: grant.patient_letter.clone(),
            from_callsign: Some(from_callsign.to_string()),
            link: Some(record_link(&grant.incident_id, grant.patient_letter.as_ref())),
            is_read: false,
            created_at: Utc::now(),
        })
        .await;
    }

    pub(crate) async fn notify_ownership_transferred(
        &self,
        incident_id: &IncidentId,
        target: &UserId,
        from_callsign: &str,
    ) {
        self.fire(Notification {
            id: Uuid::new_v4(),
            target_id: target.clone(),
            kind: "ownership_transferred".to_string(),
            title: "Incident ownership transferred to you".to_string(),
            message: format!("{from_callsign} made you the owner of incident {incident_id}"),
            incident_id: Some(incident_id.clone()),
            patient_letter: None,
            from_callsign: Some(from_callsign.to_string()),
            link: Some(record_link(incident_id, None)),
            is_read: false,
            created_at: Utc::now(),
        })
        .await;
    }

    pub(crate) async fn notify_patient_transferred(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        target: &UserId,
        from_callsign: &str,
    ) {
        self.fire(Notification {
            id: Uuid::new_v4(),
            target_id: target.clone(),
            kind: "patient_transferred".to_string(),
            title: "A patient record was transferred to you".to_string(),
            message: format!(
                "{from_callsign} transferred patient {patient_letter} of incident {incident_id} to you"
            ),
            incident_id: Some(incident_id.clone()),
            patient_letter: Some(patient_letter.clone()),
            from_callsign: Some(from_callsign.to_string()),
            link: Some(record_link(incident_id, Some(patient_letter))),
            is_read: false,
            created_at: Utc::now(),
        })
        .await;
    }

    async fn fire(&self, notification: Notification) {
        if let Err(err) = self.store.insert_notification(&notification).await {
            tracing::warn!(
                target = %notification.target_id,
                kind = %notification.kind,
                error = %err,
                "failed to persist notification"
            );
        }
    }
}

fn record_link(incident_id: &IncidentId, patient_letter: Option<&PatientLetter>) -> String {
    match patient_letter {
        Some(patient) => format!("/incident/{incident_id}/patient/{patient}"),
        None => format!("/incident/{incident_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eprf_shared::PermissionLevel;

    #[tokio::test]
    async fn test_create_requires_fields() {
        let store = Store::open_in_memory().await.unwrap();
        let service = NotificationService::new(store);

        let err = service
            .create(&UserId::from("100"), "", "t", "m", None, None, None, None)
            .await;
        assert!(matches!(err, Err(CollabError::Validation(_))));

        let created = service
            .create(
                &UserId::from("100"),
                "mention",
                "You were mentioned",
                "ping",
                None,
                None,
                Some("Medic 1"),
                None,
            )
            .await
            .unwrap();
        assert!(!created.is_read);
    }

    #[tokio::test]
    async fn test_list_includes_unread_count() {
        let store = Store::open_in_memory().await.unwrap();
        let service = NotificationService::new(store);
        let target = UserId::from("100");

        for n in 0..3 {
            service
                .create(&target, "mention", "t", &format!("m{n}"), None, None, None, None)
                .await
                .unwrap();
        }
        let listed = service.list(&target, false, 2).await.unwrap();
        assert_eq!(listed.notifications.len(), 2);
        assert_eq!(listed.unread_count, 3);
    }

    #[tokio::test]
    async fn test_collaborator_added_side_effect() {
        let store = Store::open_in_memory().await.unwrap();
        let service = NotificationService::new(store.clone());

        service
            .notify_collaborator_added(
                &Collaborator {
                    incident_id: IncidentId::from("INC-1"),
                    patient_letter: None,
                    discord_id: UserId::from("200"),
                    callsign: "Rescue 4".to_string(),
                    permission: PermissionLevel::Edit,
                    added_by: UserId::from("100"),
                    created_at: Utc::now(),
                },
                "Medic 1",
            )
            .await;

        let listed = service.list(&UserId::from("200"), true, 50).await.unwrap();
        assert_eq!(listed.unread_count, 1);
        assert_eq!(listed.notifications[0].kind, "collaborator_added");
        assert_eq!(
            listed.notifications[0].link.as_deref(),
            Some("/incident/INC-1")
        );
    }
}
