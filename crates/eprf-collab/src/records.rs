//! Patient record lifecycle.
//!
//! An incident holds one or more patient records keyed by letter.  The first
//! patient created under an incident makes its author the incident owner;
//! every later patient inherits that owner.  Status moves between
//! `incomplete` and `complete`, and a complete record carries its submission
//! time.

use chrono::Utc;

use eprf_shared::{IncidentId, IncidentRecord, IncidentStatus, PatientLetter, UserId};
use eprf_store::Store;

use crate::access::AccessControl;
use crate::error::{CollabError, Result};
use crate::notify::NotificationService;

#[derive(Clone)]
pub struct RecordsService {
    store: Store,
    access: AccessControl,
    notifications: NotificationService,
}

impl RecordsService {
    pub fn new(store: Store, access: AccessControl, notifications: NotificationService) -> Self {
        Self {
            store,
            access,
            notifications,
        }
    }

    /// Create a patient record.  The first patient of an incident makes the
    /// caller the incident owner; adding a later patient requires `edit` or
    /// better at incident scope (or admin) and inherits the existing owner.
    pub async fn create_patient(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        author: &UserId,
        author_callsign: &str,
        fleet_id: Option<String>,
    ) -> Result<IncidentRecord> {
        if incident_id.as_str().is_empty() || patient_letter.as_str().is_empty() {
            return Err(CollabError::Validation(
                "incident id and patient letter are required".to_string(),
            ));
        }
        if self
            .store
            .find_incident(incident_id, patient_letter)
            .await?
            .is_some()
        {
            return Err(CollabError::Validation(format!(
                "patient {patient_letter} already exists on {incident_id}"
            )));
        }

        let (owner_id, owner_callsign) = match self.store.incident_owner(incident_id).await? {
            Some((owner_id, owner_callsign)) => {
                if !self.access.is_admin(author) {
                    let level = self
                        .access
                        .try_resolve_incident_access(incident_id, author)
                        .await?;
                    if !level.can_edit() {
                        return Err(CollabError::Authorization(format!(
                            "{author} may not add patients to {incident_id}"
                        )));
                    }
                }
                (owner_id, owner_callsign)
            }
            None => (author.clone(), author_callsign.to_string()),
        };

        let now = Utc::now();
        let record = IncidentRecord {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.clone(),
            status: IncidentStatus::Incomplete,
            author_id: author.clone(),
            author_callsign: author_callsign.to_string(),
            owner_id,
            owner_callsign,
            fleet_id,
            created_at: now,
            updated_at: now,
            submitted_at: None,
        };
        self.store.insert_incident(&record).await?;
        tracing::info!(
            incident = %incident_id,
            patient = %patient_letter,
            author = %author,
            "patient record created"
        );
        Ok(record)
    }

    pub async fn get_record(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<IncidentRecord> {
        self.store
            .find_incident(incident_id, patient_letter)
            .await?
            .ok_or_else(|| {
                CollabError::NotFound(format!("patient {patient_letter} of {incident_id}"))
            })
    }

    pub async fn list_patients(&self, incident_id: &IncidentId) -> Result<Vec<IncidentRecord>> {
        Ok(self.store.list_incident_patients(incident_id).await?)
    }

    /// Records visible to `user`: everything for admins, otherwise records
    /// they own, authored, or hold any grant on.
    pub async fn list_records(&self, user: &UserId) -> Result<Vec<IncidentRecord>> {
        if self.access.is_admin(user) {
            Ok(self.store.list_all_incidents().await?)
        } else {
            Ok(self.store.list_incidents_for_user(user).await?)
        }
    }

    /// Move a record between `incomplete` and `complete`.  Completion stamps
    /// `submittedAt`; reopening clears it.
    pub async fn update_status(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        status: IncidentStatus,
        requested_by: &UserId,
    ) -> Result<IncidentRecord> {
        self.access
            .require_editor(incident_id, patient_letter, requested_by)
            .await?;

        let submitted_at = match status {
            IncidentStatus::Complete => Some(Utc::now()),
            IncidentStatus::Incomplete => None,
        };
        if !self
            .store
            .update_incident_status(incident_id, patient_letter, status, submitted_at)
            .await?
        {
            return Err(CollabError::NotFound(format!(
                "patient {patient_letter} of {incident_id}"
            )));
        }
        self.get_record(incident_id, patient_letter).await
    }

    /// Delete a patient record and everything under it.  Admins may always
    /// delete; otherwise only the incident owner or the patient's author, and
    /// only while the record is still incomplete.
    pub async fn delete_patient(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        requested_by: &UserId,
    ) -> Result<()> {
        let record = self.get_record(incident_id, patient_letter).await?;

        if !self.access.is_admin(requested_by) {
            if &record.owner_id != requested_by && &record.author_id != requested_by {
                return Err(CollabError::Authorization(format!(
                    "{requested_by} may not delete patient {patient_letter} of {incident_id}"
                )));
            }
            if record.status == IncidentStatus::Complete {
                return Err(CollabError::Validation(
                    "a completed record cannot be deleted".to_string(),
                ));
            }
        }

        self.store
            .delete_incident_patient(incident_id, patient_letter)
            .await?;
        tracing::info!(
            incident = %incident_id,
            patient = %patient_letter,
            by = %requested_by,
            "patient record deleted"
        );
        Ok(())
    }

    /// Hand a patient record to a new author.  Only the incident owner or
    /// the current author may transfer (admins excepted); the new author is
    /// notified.
    pub async fn transfer_patient(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        requested_by: &UserId,
        requested_by_callsign: &str,
        new_author: &UserId,
        new_author_callsign: &str,
    ) -> Result<IncidentRecord> {
        if !self.access.is_admin(requested_by)
            && !self
                .access
                .can_transfer_patient(incident_id, patient_letter, requested_by)
                .await?
        {
            return Err(CollabError::Authorization(format!(
                "{requested_by} may not transfer patient {patient_letter} of {incident_id}"
            )));
        }

        if !self
            .store
            .update_patient_author(incident_id, patient_letter, new_author, new_author_callsign)
            .await?
        {
            return Err(CollabError::NotFound(format!(
                "patient {patient_letter} of {incident_id}"
            )));
        }

        if new_author != requested_by {
            self.notifications
                .notify_patient_transferred(
                    incident_id,
                    patient_letter,
                    new_author,
                    requested_by_callsign,
                )
                .await;
        }
        self.get_record(incident_id, patient_letter).await
    }
}

#[cfg(test)]
mod tests {
    use eprf_shared::{Collaborator, PermissionLevel};

    use super::*;

    async fn services(admins: Vec<&str>) -> (Store, RecordsService) {
        let store = Store::open_in_memory().await.unwrap();
        let access = AccessControl::new(
            store.clone(),
            admins.into_iter().map(UserId::from).collect::<Vec<_>>(),
        );
        let notifications = NotificationService::new(store.clone());
        let records = RecordsService::new(store.clone(), access, notifications);
        (store, records)
    }

    async fn grant(store: &Store, user: &str, level: PermissionLevel) {
        store
            .upsert_collaborator(&Collaborator {
                incident_id: IncidentId::from("INC-1"),
                patient_letter: None,
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
    async fn test_first_patient_sets_owner_later_inherit() {
        let (store, records) = services(vec![]).await;
        let incident = IncidentId::from("INC-1");

        let first = records
            .create_patient(&incident, &PatientLetter::from("A"), &UserId::from("100"), "Medic 1", None)
            .await
            .unwrap();
        assert_eq!(first.owner_id, UserId::from("100"));
        assert_eq!(first.status, IncidentStatus::Incomplete);

        // A stranger cannot add a second patient.
        let denied = records
            .create_patient(&incident, &PatientLetter::from("B"), &UserId::from("200"), "Unit 200", None)
            .await;
        assert!(matches!(denied, Err(CollabError::Authorization(_))));

        // An edit collaborator can, and the owner is inherited.
        grant(&store, "200", PermissionLevel::Edit).await;
        let second = records
            .create_patient(&incident, &PatientLetter::from("B"), &UserId::from("200"), "Unit 200", None)
            .await
            .unwrap();
        assert_eq!(second.owner_id, UserId::from("100"));
        assert_eq!(second.author_id, UserId::from("200"));
    }

    #[tokio::test]
    async fn test_duplicate_patient_letter_rejected() {
        let (_store, records) = services(vec![]).await;
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        records
            .create_patient(&incident, &patient, &UserId::from("100"), "Medic 1", None)
            .await
            .unwrap();
        let dup = records
            .create_patient(&incident, &patient, &UserId::from("100"), "Medic 1", None)
            .await;
        assert!(matches!(dup, Err(CollabError::Validation(_))));
    }

    #[tokio::test]
    async fn test_status_round_trip_stamps_submission() {
        let (_store, records) = services(vec![]).await;
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");
        let owner = UserId::from("100");

        records
            .create_patient(&incident, &patient, &owner, "Medic 1", None)
            .await
            .unwrap();

        let complete = records
            .update_status(&incident, &patient, IncidentStatus::Complete, &owner)
            .await
            .unwrap();
        assert_eq!(complete.status, IncidentStatus::Complete);
        assert!(complete.submitted_at.is_some());

        let reopened = records
            .update_status(&incident, &patient, IncidentStatus::Incomplete, &owner)
            .await
            .unwrap();
        assert!(reopened.submitted_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_guards() {
        let (store, records) = services(vec!["42"]).await;
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");
        let owner = UserId::from("100");

        records
            .create_patient(&incident, &patient, &owner, "Medic 1", None)
            .await
            .unwrap();
        grant(&store, "200", PermissionLevel::Manage).await;

        // A manage collaborator is neither owner nor author.
        let denied = records
            .delete_patient(&incident, &patient, &UserId::from("200"))
            .await;
        assert!(matches!(denied, Err(CollabError::Authorization(_))));

        // A completed record refuses deletion by its owner...
        records
            .update_status(&incident, &patient, IncidentStatus::Complete, &owner)
            .await
            .unwrap();
        let refused = records.delete_patient(&incident, &patient, &owner).await;
        assert!(matches!(refused, Err(CollabError::Validation(_))));

        // ...but an admin may force it.
        records
            .delete_patient(&incident, &patient, &UserId::from("42"))
            .await
            .unwrap();
        assert!(records.get_record(&incident, &patient).await.is_err());
    }

    #[tokio::test]
    async fn test_transfer_updates_author_and_notifies() {
        let (store, records) = services(vec![]).await;
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");
        let owner = UserId::from("100");

        records
            .create_patient(&incident, &patient, &owner, "Medic 1", None)
            .await
            .unwrap();

        let transferred = records
            .transfer_patient(&incident, &patient, &owner, "Medic 1", &UserId::from("200"), "Unit 200")
            .await
            .unwrap();
        assert_eq!(transferred.author_id, UserId::from("200"));
        // Ownership is unchanged by an author transfer.
        assert_eq!(transferred.owner_id, owner);

        assert_eq!(
            store
                .unread_notification_count(&UserId::from("200"))
                .await
                .unwrap(),
            1
        );

        // The new author may transfer onward; a bystander may not.
        let denied = records
            .transfer_patient(&incident, &patient, &UserId::from("300"), "Unit 300", &owner, "Medic 1")
            .await;
        assert!(matches!(denied, Err(CollabError::Authorization(_))));
    }
}
