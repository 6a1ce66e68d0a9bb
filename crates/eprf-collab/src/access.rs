//! Authorization engine.
//!
//! Resolves a `(user, incident, patient)` triple to an effective permission
//! level.  The effective level is the highest of the owner check, the
//! incident-level grant, and the patient-level grant; a user with no grant
//! at all resolves to `view`, which is also what the form UI assumes for an
//! unset permission.
//!
//! Resolution is fail-closed: when the store is unreachable,
//! [`AccessControl::resolve_access`] logs and returns `view`, never an
//! elevated level.  Mutation gates use the fallible
//! [`AccessControl::try_resolve_access`] instead so a store outage refuses
//! the write outright.

use std::collections::HashSet;
use std::sync::Arc;

use eprf_shared::{IncidentId, PatientLetter, PermissionLevel, UserId};
use eprf_store::Store;

use crate::error::{CollabError, Result};

#[derive(Clone)]
pub struct AccessControl {
    store: Store,
    /// Externally configured administrative identities.  Admins bypass
    /// permission checks on administrative endpoints (record listing, forced
    /// transfer/delete) only — they hold no role in the general model.
    admin_ids: Arc<HashSet<UserId>>,
}

impl AccessControl {
    pub fn new(store: Store, admin_ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            store,
            admin_ids: Arc::new(admin_ids.into_iter().collect()),
        }
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admin_ids.contains(user)
    }

    /// Effective permission of `user` on one patient.  Propagates store
    /// failures as typed errors; mutation paths must use this flavor.
    pub async fn try_resolve_access(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<PermissionLevel> {
        if let Some((owner_id, _)) = self.store.incident_owner(incident_id).await? {
            if &owner_id == user {
                return Ok(PermissionLevel::Owner);
            }
        }

        let mut level = PermissionLevel::View;
        if let Some(grant) = self.store.find_collaborator(incident_id, None, user).await? {
            level = level.max(grant.permission);
        }
        if let Some(grant) = self
            .store
            .find_collaborator(incident_id, Some(patient_letter), user)
            .await?
        {
            level = level.max(grant.permission);
        }
        Ok(level)
    }

    /// Effective permission of `user` at incident scope: the owner check and
    /// the incident-level grant only.  Patient-scoped grants do not confer
    /// any right over the incident as a whole.
    pub async fn try_resolve_incident_access(
        &self,
        incident_id: &IncidentId,
        user: &UserId,
    ) -> Result<PermissionLevel> {
        if let Some((owner_id, _)) = self.store.incident_owner(incident_id).await? {
            if &owner_id == user {
                return Ok(PermissionLevel::Owner);
            }
        }
        Ok(self
            .store
            .find_collaborator(incident_id, None, user)
            .await?
            .map(|grant| grant.permission)
            .unwrap_or(PermissionLevel::View))
    }

    /// Fail-closed resolution for read paths: a store failure degrades to
    /// `view`, never to an elevated level.
    pub async fn resolve_access(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> PermissionLevel {
        match self
            .try_resolve_access(incident_id, patient_letter, user)
            .await
        {
            Ok(level) => level,
            Err(err) => {
                tracing::warn!(
                    incident = %incident_id,
                    patient = %patient_letter,
                    user = %user,
                    error = %err,
                    "access resolution failed, denying"
                );
                PermissionLevel::View
            }
        }
    }

    /// True iff `user` may transfer the patient record to someone else:
    /// the incident owner or the patient's current author, nobody else
    /// regardless of `edit`/`manage` grants.
    pub async fn can_transfer_patient(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<bool> {
        let record = self
            .store
            .find_incident(incident_id, patient_letter)
            .await?
            .ok_or_else(|| {
                CollabError::NotFound(format!("patient {patient_letter} of {incident_id}"))
            })?;
        Ok(&record.owner_id == user || &record.author_id == user)
    }

    /// Refuse unless `user` resolves to `edit` or better on the patient.
    pub async fn require_editor(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<PermissionLevel> {
        let level = self
            .try_resolve_access(incident_id, patient_letter, user)
            .await?;
        if level.can_edit() {
            Ok(level)
        } else {
            Err(CollabError::Authorization(format!(
                "{user} has {level} access, edit required"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use eprf_shared::{Collaborator, IncidentRecord, IncidentStatus};

    use super::*;

    async fn store_with_incident() -> Store {
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
        store
    }

    async fn grant(store: &Store, patient: Option<&str>, user: &str, level: PermissionLevel) {
        store
            .upsert_collaborator(&Collaborator {
                incident_id: IncidentId::from("INC-1"),
                patient_letter: patient.map(PatientLetter::from),
                discord_id: UserId::from(user),
                callsign: format!("Unit {user}"),
                permission: level,
                added_by: UserId::from("100"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_owner_resolves_to_owner() {
        let store = store_with_incident().await;
        let access = AccessControl::new(store, []);

        let level = access
            .try_resolve_access(
                &IncidentId::from("INC-1"),
                &PatientLetter::from("A"),
                &UserId::from("100"),
            )
            .await
            .unwrap();
        assert_eq!(level, PermissionLevel::Owner);
    }

    #[tokio::test]
    async fn test_unknown_user_defaults_to_view() {
        let store = store_with_incident().await;
        let access = AccessControl::new(store, []);

        let level = access
            .try_resolve_access(
                &IncidentId::from("INC-1"),
                &PatientLetter::from("A"),
                &UserId::from("999"),
            )
            .await
            .unwrap();
        assert_eq!(level, PermissionLevel::View);
    }

    #[tokio::test]
    async fn test_effective_level_is_highest_of_grants() {
        let store = store_with_incident().await;
        grant(&store, None, "200", PermissionLevel::View).await;
        grant(&store, Some("A"), "200", PermissionLevel::Manage).await;
        let access = AccessControl::new(store, []);

        let level = access
            .try_resolve_access(
                &IncidentId::from("INC-1"),
                &PatientLetter::from("A"),
                &UserId::from("200"),
            )
            .await
            .unwrap();
        assert_eq!(level, PermissionLevel::Manage);

        // The patient-level grant does not leak into incident scope.
        let incident_level = access
            .try_resolve_incident_access(&IncidentId::from("INC-1"), &UserId::from("200"))
            .await
            .unwrap();
        assert_eq!(incident_level, PermissionLevel::View);
    }

    #[tokio::test]
    async fn test_transfer_only_owner_or_author() {
        let store = store_with_incident().await;
        grant(&store, None, "200", PermissionLevel::Manage).await;
        grant(&store, None, "300", PermissionLevel::Edit).await;
        let access = AccessControl::new(store.clone(), []);

        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        assert!(access
            .can_transfer_patient(&incident, &patient, &UserId::from("100"))
            .await
            .unwrap());
        // manage and edit grants do not allow transfer.
        assert!(!access
            .can_transfer_patient(&incident, &patient, &UserId::from("200"))
            .await
            .unwrap());
        assert!(!access
            .can_transfer_patient(&incident, &patient, &UserId::from("300"))
            .await
            .unwrap());

        let missing = access
            .can_transfer_patient(&incident, &PatientLetter::from("Z"), &UserId::from("100"))
            .await;
        assert!(matches!(missing, Err(CollabError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolution_fails_closed_on_store_error() {
        let store = store_with_incident().await;
        let access = AccessControl::new(store.clone(), []);
        store.close().await.unwrap();

        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        // The fallible flavor surfaces the outage...
        let err = access
            .try_resolve_access(&incident, &patient, &UserId::from("100"))
            .await;
        assert!(matches!(err, Err(CollabError::Store(_))));

        // ...and the infallible flavor denies, even for the real owner.
        let level = access
            .resolve_access(&incident, &patient, &UserId::from("100"))
            .await;
        assert_eq!(level, PermissionLevel::View);
    }

    #[tokio::test]
    async fn test_admin_allow_list() {
        let store = store_with_incident().await;
        let access = AccessControl::new(store, [UserId::from("42")]);
        assert!(access.is_admin(&UserId::from("42")));
        assert!(!access.is_admin(&UserId::from("100")));
    }
}
