use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use eprf_shared::{IncidentId, IncidentRecord, IncidentStatus, PatientLetter, UserId};

use crate::database::Store;
use crate::encode::{column_dt, column_opt_dt, column_parse, encode_dt};
use crate::error::{Result, StoreError};

const COLUMNS: &str = "incident_id, patient_letter, status, author_id, author_callsign, \
     owner_id, owner_callsign, fleet_id, created_at, updated_at, submitted_at";

impl Store {
    pub async fn insert_incident(&self, record: &IncidentRecord) -> Result<()> {
        let record = record.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO incidents (incident_id, patient_letter, status, author_id,
                     author_callsign, owner_id, owner_callsign, fleet_id, created_at,
                     updated_at, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.incident_id.as_str(),
                    record.patient_letter.as_str(),
                    record.status.as_str(),
                    record.author_id.as_str(),
                    record.author_callsign,
                    record.owner_id.as_str(),
                    record.owner_callsign,
                    record.fleet_id,
                    encode_dt(record.created_at),
                    encode_dt(record.updated_at),
                    record.submitted_at.map(encode_dt),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Fetch one patient record, or `None` if the pair is unknown.
    pub async fn find_incident(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<Option<IncidentRecord>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        self.call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM incidents
                     WHERE incident_id = ?1 AND patient_letter = ?2"
                ),
                params![incident, patient],
                row_to_incident,
            )
            .optional()
        })
        .await
    }

    pub async fn get_incident(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<IncidentRecord> {
        self.find_incident(incident_id, patient_letter)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// All patient records under an incident, ordered by patient letter.
    pub async fn list_incident_patients(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Vec<IncidentRecord>> {
        let incident = incident_id.as_str().to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM incidents
                 WHERE incident_id = ?1
                 ORDER BY patient_letter ASC"
            ))?;
            let rows = stmt.query_map(params![incident], row_to_incident)?;
            rows.collect()
        })
        .await
    }

    /// The incident owner's id and callsign, if the incident has any patients.
    ///
    /// Every patient row carries the same owner columns, so any row answers.
    pub async fn incident_owner(
        &self,
        incident_id: &IncidentId,
    ) -> Result<Option<(UserId, String)>> {
        let incident = incident_id.as_str().to_owned();
        self.call(move |conn| {
            conn.query_row(
                "SELECT owner_id, owner_callsign FROM incidents
                 WHERE incident_id = ?1 LIMIT 1",
                params![incident],
                |row| {
                    let id: String = row.get(0)?;
                    let callsign: String = row.get(1)?;
                    Ok((UserId::new(id), callsign))
                },
            )
            .optional()
        })
        .await
    }

    /// Records the user owns, authored, or collaborates on (either scope).
    pub async fn list_incidents_for_user(&self, user: &UserId) -> Result<Vec<IncidentRecord>> {
        let user = user.as_str().to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM incidents i
                 WHERE i.owner_id = ?1
                    OR i.author_id = ?1
                    OR EXISTS (SELECT 1 FROM collaborators c
                               WHERE c.incident_id = i.incident_id AND c.discord_id = ?1)
                    OR EXISTS (SELECT 1 FROM patient_collaborators p
                               WHERE p.incident_id = i.incident_id
                                 AND p.patient_letter = i.patient_letter
                                 AND p.discord_id = ?1)
                 ORDER BY i.updated_at DESC"
            ))?;
            let rows = stmt.query_map(params![user], row_to_incident)?;
            rows.collect()
        })
        .await
    }

    /// Every record in the store, newest activity first.  Admin listing only.
    pub async fn list_all_incidents(&self) -> Result<Vec<IncidentRecord>> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM incidents ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map([], row_to_incident)?;
            rows.collect()
        })
        .await
    }

    pub async fn update_incident_status(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        status: IncidentStatus,
        submitted_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let now = encode_dt(Utc::now());
        self.call(move |conn| {
            let affected = conn.execute(
                "UPDATE incidents
                 SET status = ?3, submitted_at = ?4, updated_at = ?5
                 WHERE incident_id = ?1 AND patient_letter = ?2",
                params![
                    incident,
                    patient,
                    status.as_str(),
                    submitted_at.map(encode_dt),
                    now
                ],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    /// Bump `updated_at`, recording form activity on the patient.
    pub async fn touch_incident(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<()> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let now = encode_dt(Utc::now());
        self.call(move |conn| {
            conn.execute(
                "UPDATE incidents SET updated_at = ?3
                 WHERE incident_id = ?1 AND patient_letter = ?2",
                params![incident, patient, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Re-point a patient record at a new author.
    pub async fn update_patient_author(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        author_id: &UserId,
        author_callsign: &str,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let author = author_id.as_str().to_owned();
        let callsign = author_callsign.to_owned();
        let now = encode_dt(Utc::now());
        self.call(move |conn| {
            let affected = conn.execute(
                "UPDATE incidents
                 SET author_id = ?3, author_callsign = ?4, updated_at = ?5
                 WHERE incident_id = ?1 AND patient_letter = ?2",
                params![incident, patient, author, callsign, now],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    /// Re-point every patient row of the incident at a new owner.
    pub async fn update_incident_owner(
        &self,
        incident_id: &IncidentId,
        owner_id: &UserId,
        owner_callsign: &str,
    ) -> Result<usize> {
        let incident = incident_id.as_str().to_owned();
        let owner = owner_id.as_str().to_owned();
        let callsign = owner_callsign.to_owned();
        let now = encode_dt(Utc::now());
        self.call(move |conn| {
            let affected = conn.execute(
                "UPDATE incidents
                 SET owner_id = ?2, owner_callsign = ?3, updated_at = ?4
                 WHERE incident_id = ?1",
                params![incident, owner, callsign, now],
            )?;
            Ok(affected)
        })
        .await
    }

    /// Delete one patient record and everything hanging off it.
    pub async fn delete_incident_patient(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            for table in [
                "sections",
                "patient_collaborators",
                "presence",
                "cursors",
                "versions",
            ] {
                tx.execute(
                    &format!(
                        "DELETE FROM {table} WHERE incident_id = ?1 AND patient_letter = ?2"
                    ),
                    params![incident, patient],
                )?;
            }
            tx.execute(
                "DELETE FROM chat_messages
                 WHERE incident_id = ?1 AND patient_letter = ?2",
                params![incident, patient],
            )?;
            let affected = tx.execute(
                "DELETE FROM incidents WHERE incident_id = ?1 AND patient_letter = ?2",
                params![incident, patient],
            )?;
            tx.commit()?;
            Ok(affected > 0)
        })
        .await
    }
}

fn row_to_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<IncidentRecord> {
    Ok(IncidentRecord {
        incident_id: IncidentId::new(row.get::<_, String>(0)?),
        patient_letter: PatientLetter::new(row.get::<_, String>(1)?),
        status: column_parse(row, 2)?,
        author_id: UserId::new(row.get::<_, String>(3)?),
        author_callsign: row.get(4)?,
        owner_id: UserId::new(row.get::<_, String>(5)?),
        owner_callsign: row.get(6)?,
        fleet_id: row.get(7)?,
        created_at: column_dt(row, 8)?,
        updated_at: column_dt(row, 9)?,
        submitted_at: column_opt_dt(row, 10)?,
    })
}
