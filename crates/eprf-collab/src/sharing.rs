//! Permission-gated collaborator management and sharing.
//!
//! Every mutation here is gated on the caller's resolved permission via
//! [`PermissionLevel::can_manage_collaborators`], with one extra rule
//! blocking lateral escalation: only the owner may grant the `manage` level
//! or alter an existing `manage` holder.  Ownership transfer demotes the
//! former owner to a `view` collaborator rather than removing them.

use chrono::Utc;
use uuid::Uuid;

use eprf_shared::{
    Collaborator, IncidentId, PatientLetter, PermissionLevel, RosterEntry, ShareLink, UserId,
};
use eprf_store::Store;

use crate::access::AccessControl;
use crate::error::{CollabError, Result};
use crate::notify::NotificationService;

#[derive(Clone)]
pub struct SharingService {
    store: Store,
    access: AccessControl,
    notifications: NotificationService,
}

impl SharingService {
    pub fn new(store: Store, access: AccessControl, notifications: NotificationService) -> Self {
        Self {
            store,
            access,
            notifications,
        }
    }

    /// The caller's level in the scope a grant mutation applies to.
    async fn caller_level(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        caller: &UserId,
    ) -> Result<PermissionLevel> {
        match patient_letter {
            // Incident-wide grants require incident-wide standing; a
            // patient-scoped manage grant is not enough.
            None => {
                self.access
                    .try_resolve_incident_access(incident_id, caller)
                    .await
            }
            Some(patient) => {
                self.access
                    .try_resolve_access(incident_id, patient, caller)
                    .await
            }
        }
    }

    /// Shared gate for add/update/remove: the caller must manage
    /// collaborators in the scope, and only the owner may create `manage`
    /// grants or touch an existing `manage` holder or the owner.
    async fn authorize_grant_mutation(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        target: &UserId,
        new_level: Option<PermissionLevel>,
        caller: &UserId,
    ) -> Result<PermissionLevel> {
        let caller_level = self
            .caller_level(incident_id, patient_letter, caller)
            .await?;
        if !caller_level.can_manage_collaborators() {
            return Err(CollabError::Authorization(format!(
                "{caller} has {caller_level} access, manage required"
            )));
        }

        if let Some((owner_id, _)) = self.store.incident_owner(incident_id).await? {
            if &owner_id == target {
                return Err(CollabError::Validation(
                    "the incident owner cannot be a collaborator".to_string(),
                ));
            }
        }

        if caller_level < PermissionLevel::Owner {
            if new_level == Some(PermissionLevel::Manage) {
                return Err(CollabError::Authorization(
                    "only the owner may grant manage".to_string(),
                ));
            }
            let existing = self
                .store
                .find_collaborator(incident_id, patient_letter, target)
                .await?;
            if existing.map(|grant| grant.permission) == Some(PermissionLevel::Manage) {
                return Err(CollabError::Authorization(
                    "only the owner may alter a manage holder".to_string(),
                ));
            }
        }

        Ok(caller_level)
    }

    pub async fn add_collaborator(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        target: &UserId,
        target_callsign: &str,
        level: PermissionLevel,
        requested_by: &UserId,
        requested_by_callsign: &str,
    ) -> Result<Collaborator> {
        if level == PermissionLevel::Owner {
            return Err(CollabError::Validation(
                "ownership is granted by transfer, not as a collaborator level".to_string(),
            ));
        }
        self.authorize_grant_mutation(incident_id, patient_letter, target, Some(level), requested_by)
            .await?;

        let grant = Collaborator {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.cloned(),
            discord_id: target.clone(),
            callsign: target_callsign.to_string(),
            permission: level,
            added_by: requested_by.clone(),
            created_at: Utc::now(),
        };
        self.store.upsert_collaborator(&grant).await?;

        tracing::info!(
            incident = %incident_id,
            target = %target,
            level = %level,
            by = %requested_by,
            "collaborator added"
        );

        if target != requested_by {
            self.notifications
                .notify_collaborator_added(&grant, requested_by_callsign)
                .await;
        }

        Ok(grant)
    }

    pub async fn update_collaborator(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        target: &UserId,
        level: PermissionLevel,
        requested_by: &UserId,
    ) -> Result<Collaborator> {
        if level == PermissionLevel::Owner {
            return Err(CollabError::Validation(
                "ownership is granted by transfer, not as a collaborator level".to_string(),
            ));
        }
        self.authorize_grant_mutation(incident_id, patient_letter, target, Some(level), requested_by)
            .await?;

        let mut grant = self
            .store
            .find_collaborator(incident_id, patient_letter, target)
            .await?
            .ok_or_else(|| CollabError::NotFound(format!("no grant for {target}")))?;
        grant.permission = level;
        self.store.upsert_collaborator(&grant).await?;

        tracing::info!(
            incident = %incident_id,
            target = %target,
            level = %level,
            by = %requested_by,
            "collaborator permission updated"
        );
        Ok(grant)
    }

    pub async fn remove_collaborator(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        target: &UserId,
        requested_by: &UserId,
    ) -> Result<()> {
        self.authorize_grant_mutation(incident_id, patient_letter, target, None, requested_by)
            .await?;

        let removed = self
            .store
            .remove_collaborator(incident_id, patient_letter, target)
            .await?;
        if !removed {
            return Err(CollabError::NotFound(format!("no grant for {target}")));
        }

        tracing::info!(
            incident = %incident_id,
            target = %target,
            by = %requested_by,
            "collaborator removed"
        );
        Ok(())
    }

    /// Hand the incident to a new owner.  Only the current owner may do
    /// this, and only for themselves; the former owner stays on as a `view`
    /// collaborator so they keep read access to their old records.
    pub async fn transfer_ownership(
        &self,
        incident_id: &IncidentId,
        from: &UserId,
        from_callsign: &str,
        to: &UserId,
        to_callsign: &str,
        requested_by: &UserId,
    ) -> Result<()> {
        if requested_by != from {
            return Err(CollabError::Authorization(
                "only the current owner may transfer ownership".to_string(),
            ));
        }
        let (owner_id, _) = self
            .store
            .incident_owner(incident_id)
            .await?
            .ok_or_else(|| CollabError::NotFound(format!("incident {incident_id}")))?;
        if &owner_id != from {
            return Err(CollabError::Authorization(format!(
                "{from} is not the owner of {incident_id}"
            )));
        }
        if from == to {
            return Err(CollabError::Validation(
                "cannot transfer ownership to the current owner".to_string(),
            ));
        }

        self.store
            .update_incident_owner(incident_id, to, to_callsign)
            .await?;
        // The new owner's permission is implicit now; drop any stored grant.
        self.store
            .remove_collaborator(incident_id, None, to)
            .await?;
        self.store
            .upsert_collaborator(&Collaborator {
                incident_id: incident_id.clone(),
                patient_letter: None,
                discord_id: from.clone(),
                callsign: from_callsign.to_string(),
                permission: PermissionLevel::View,
                added_by: from.clone(),
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(incident = %incident_id, from = %from, to = %to, "ownership transferred");

        self.notifications
            .notify_ownership_transferred(incident_id, to, from_callsign)
            .await;
        Ok(())
    }

    /// Mint an opaque capability token granting `level` to whoever redeems
    /// it.  Redemption mechanics are external; the token and its scope are
    /// simply persisted.
    pub async fn create_share_link(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        level: PermissionLevel,
        requested_by: &UserId,
    ) -> Result<ShareLink> {
        if level == PermissionLevel::Owner {
            return Err(CollabError::Validation(
                "share links cannot grant ownership".to_string(),
            ));
        }
        let caller_level = self
            .caller_level(incident_id, patient_letter, requested_by)
            .await?;
        if !caller_level.can_manage_collaborators() {
            return Err(CollabError::Authorization(format!(
                "{requested_by} has {caller_level} access, manage required"
            )));
        }
        if level == PermissionLevel::Manage && caller_level < PermissionLevel::Owner {
            return Err(CollabError::Authorization(
                "only the owner may mint manage links".to_string(),
            ));
        }

        let link = ShareLink {
            token: Uuid::new_v4(),
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.cloned(),
            permission: level,
            created_by: requested_by.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_share_link(&link).await?;

        tracing::info!(incident = %incident_id, level = %level, by = %requested_by, "share link created");
        Ok(link)
    }

    pub async fn list_collaborators(&self, incident_id: &IncidentId) -> Result<Vec<Collaborator>> {
        Ok(self.store.list_collaborators(incident_id).await?)
    }

    pub async fn list_patient_collaborators(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<Vec<Collaborator>> {
        Ok(self
            .store
            .list_patient_collaborators(incident_id, patient_letter)
            .await?)
    }

    /// Everyone mentionable in the incident's chat channels.
    pub async fn roster(&self, incident_id: &IncidentId) -> Result<Vec<RosterEntry>> {
        Ok(self.store.roster(incident_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use eprf_shared::{IncidentRecord, IncidentStatus};

    use super::*;

    async fn fixture() -> (Store, SharingService) {
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

        let access = AccessControl::new(store.clone(), []);
        let notifications = NotificationService::new(store.clone());
        let sharing = SharingService::new(store.clone(), access, notifications);
        (store, sharing)
    }

    #[tokio::test]
    async fn test_permission_escalation_walkthrough() {
        let (_store, sharing) = fixture().await;
        let incident = IncidentId::from("INC-1");
        let owner = UserId::from("100");
        let u = UserId::from("200");
        let v = UserId::from("300");

        // Owner adds U at edit.
        sharing
            .add_collaborator(&incident, None, &u, "Rescue 4", PermissionLevel::Edit, &owner, "Medic 1")
            .await
            .unwrap();

        // U (edit) cannot add collaborators.
        let denied = sharing
            .add_collaborator(&incident, None, &v, "Rescue 5", PermissionLevel::View, &u, "Rescue 4")
            .await;
        assert!(matches!(denied, Err(CollabError::Authorization(_))));

        // Owner promotes U to manage; U can now add V at view.
        sharing
            .update_collaborator(&incident, None, &u, PermissionLevel::Manage, &owner)
            .await
            .unwrap();
        sharing
            .add_collaborator(&incident, None, &v, "Rescue 5", PermissionLevel::View, &u, "Rescue 4")
            .await
            .unwrap();

        // U (manage) may not elevate V to manage — owner only.
        let denied = sharing
            .update_collaborator(&incident, None, &v, PermissionLevel::Manage, &u)
            .await;
        assert!(matches!(denied, Err(CollabError::Authorization(_))));
    }

    #[tokio::test]
    async fn test_manage_holder_is_untouchable_by_peers() {
        let (_store, sharing) = fixture().await;
        let incident = IncidentId::from("INC-1");
        let owner = UserId::from("100");
        let m1 = UserId::from("200");
        let m2 = UserId::from("300");

        for (id, callsign) in [(&m1, "Rescue 4"), (&m2, "Rescue 5")] {
            sharing
                .add_collaborator(&incident, None, id, callsign, PermissionLevel::Manage, &owner, "Medic 1")
                .await
                .unwrap();
        }

        // One manage holder cannot demote or remove another.
        assert!(matches!(
            sharing
                .update_collaborator(&incident, None, &m2, PermissionLevel::View, &m1)
                .await,
            Err(CollabError::Authorization(_))
        ));
        assert!(matches!(
            sharing.remove_collaborator(&incident, None, &m2, &m1).await,
            Err(CollabError::Authorization(_))
        ));

        // The owner can.
        sharing
            .remove_collaborator(&incident, None, &m2, &owner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transfer_demotes_former_owner_to_view() {
        let (store, sharing) = fixture().await;
        let incident = IncidentId::from("INC-1");
        let owner = UserId::from("100");
        let heir = UserId::from("200");

        // Only the owner, acting as themselves, may transfer.
        assert!(matches!(
            sharing
                .transfer_ownership(&incident, &owner, "Medic 1", &heir, "Rescue 4", &heir)
                .await,
            Err(CollabError::Authorization(_))
        ));

        sharing
            .transfer_ownership(&incident, &owner, "Medic 1", &heir, "Rescue 4", &owner)
            .await
            .unwrap();

        let (new_owner, _) = store.incident_owner(&incident).await.unwrap().unwrap();
        assert_eq!(new_owner, heir);

        let demoted = store
            .find_collaborator(&incident, None, &owner)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(demoted.permission, PermissionLevel::View);
    }

    #[tokio::test]
    async fn test_share_link_gating() {
        let (_store, sharing) = fixture().await;
        let incident = IncidentId::from("INC-1");
        let owner = UserId::from("100");
        let manager = UserId::from("200");

        sharing
            .add_collaborator(&incident, None, &manager, "Rescue 4", PermissionLevel::Manage, &owner, "Medic 1")
            .await
            .unwrap();

        // A manage holder can mint edit links but not manage links.
        let link = sharing
            .create_share_link(&incident, None, PermissionLevel::Edit, &manager)
            .await
            .unwrap();
        assert_eq!(link.permission, PermissionLevel::Edit);

        assert!(matches!(
            sharing
                .create_share_link(&incident, None, PermissionLevel::Manage, &manager)
                .await,
            Err(CollabError::Authorization(_))
        ));

        let owner_link = sharing
            .create_share_link(
                &incident,
                Some(&PatientLetter::from("A")),
                PermissionLevel::Manage,
                &owner,
            )
            .await
            .unwrap();
        assert_eq!(owner_link.patient_letter, Some(PatientLetter::from("A")));
    }
}
