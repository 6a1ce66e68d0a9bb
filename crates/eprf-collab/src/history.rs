//! Version history engine.
//!
//! Every section save appends a version entry holding both snapshots and
//! the structural diff between them; identical snapshots are an idempotent
//! no-op.  Restore is "undo this change": the live section is overwritten
//! with the entry's `previous_data` and the restore itself is appended as a
//! new entry, so history is monotonically append-only and an undo is both
//! auditable and undoable.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use eprf_shared::constants::HISTORY_DEFAULT_LIMIT;
use eprf_shared::{
    compute_diff, IncidentId, PatientLetter, PermissionLevel, SectionDocument, UserId, VersionEntry,
};
use eprf_store::Store;

use crate::access::AccessControl;
use crate::error::{CollabError, Result};

#[derive(Clone)]
pub struct HistoryEngine {
    store: Store,
    access: AccessControl,
}

impl HistoryEngine {
    pub fn new(store: Store, access: AccessControl) -> Self {
        Self { store, access }
    }

    /// Record one change to a section.  Returns `None` when the snapshots
    /// are structurally identical — no entry is written.
    ///
    /// When no `summary` is supplied one is synthesized from the diff
    /// counts ("2 fields modified, 1 field added").
    #[allow(clippy::too_many_arguments)]
    pub async fn record_version(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        section_name: &str,
        changed_by: &UserId,
        changed_by_callsign: &str,
        previous: &SectionDocument,
        next: &SectionDocument,
        summary: Option<String>,
    ) -> Result<Option<VersionEntry>> {
        if section_name.is_empty() {
            return Err(CollabError::Validation("section name is required".to_string()));
        }
        self.access
            .require_editor(incident_id, patient_letter, changed_by)
            .await?;

        let diff = compute_diff(previous, next);
        if diff.is_empty() {
            tracing::debug!(
                incident = %incident_id,
                patient = %patient_letter,
                section = section_name,
                "identical snapshots, skipping version entry"
            );
            return Ok(None);
        }

        let change_summary = summary.unwrap_or_else(|| diff.summary());
        let entry = VersionEntry {
            id: Uuid::new_v4(),
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.clone(),
            section_name: section_name.to_string(),
            changed_by: changed_by.clone(),
            changed_by_callsign: changed_by_callsign.to_string(),
            previous_data: previous.clone(),
            new_data: next.clone(),
            diff_data: serde_json::to_value(&diff)
                .map_err(eprf_store::StoreError::from)?,
            change_summary,
            created_at: Utc::now(),
        };
        self.store.insert_version(&entry).await?;
        Ok(Some(entry))
    }

    /// Version entries for an incident, newest first, optionally narrowed by
    /// patient and/or section.
    pub async fn list_history(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        section_name: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<VersionEntry>> {
        Ok(self
            .store
            .list_versions(
                incident_id,
                patient_letter,
                section_name,
                limit.unwrap_or(HISTORY_DEFAULT_LIMIT),
            )
            .await?)
    }

    /// One entry by id, checked against the incident it is queried under.
    pub async fn get_version(
        &self,
        incident_id: &IncidentId,
        version_id: Uuid,
    ) -> Result<VersionEntry> {
        let entry = self
            .store
            .find_version(version_id)
            .await?
            .filter(|entry| &entry.incident_id == incident_id)
            .ok_or_else(|| CollabError::NotFound(format!("version {version_id}")))?;
        Ok(entry)
    }

    /// Undo the change a version entry recorded.
    ///
    /// Allowed for the incident owner, the patient's author, or a resolved
    /// `manage` holder on the version's patient — never for plain
    /// `edit`/`view`.  The live section is overwritten with the entry's
    /// `previous_data` and a new entry is appended recording the restore.
    pub async fn restore(
        &self,
        incident_id: &IncidentId,
        version_id: Uuid,
        requested_by: &UserId,
        requested_by_callsign: &str,
    ) -> Result<SectionDocument> {
        let entry = self.get_version(incident_id, version_id).await?;

        let allowed = if self
            .access
            .can_transfer_patient(incident_id, &entry.patient_letter, requested_by)
            .await?
        {
            // Incident owner or patient author.
            true
        } else {
            let level = self
                .access
                .try_resolve_access(incident_id, &entry.patient_letter, requested_by)
                .await?;
            level >= PermissionLevel::Manage
        };
        if !allowed {
            return Err(CollabError::Authorization(format!(
                "{requested_by} may not restore versions of patient {}",
                entry.patient_letter
            )));
        }

        let restored = entry.previous_data.clone();
        self.store
            .upsert_section(incident_id, &entry.patient_letter, &entry.section_name, &restored)
            .await?;
        self.store
            .touch_incident(incident_id, &entry.patient_letter)
            .await?;

        let restore_entry = VersionEntry {
            id: Uuid::new_v4(),
            incident_id: incident_id.clone(),
            patient_letter: entry.patient_letter.clone(),
            section_name: entry.section_name.clone(),
            changed_by: requested_by.clone(),
            changed_by_callsign: requested_by_callsign.to_string(),
            previous_data: entry.new_data.clone(),
            new_data: restored.clone(),
            diff_data: json!({ "restored": true, "fromVersionId": version_id }),
            change_summary: "Restored to previous version".to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_version(&restore_entry).await?;

        tracing::info!(
            incident = %incident_id,
            patient = %entry.patient_letter,
            section = %entry.section_name,
            version = %version_id,
            by = %requested_by,
            "section restored to previous version"
        );
        Ok(restored)
    }
}
