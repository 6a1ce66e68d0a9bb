//! Collaborator grants, incident- and patient-scoped.
//!
//! A [`Collaborator`] with `patient_letter: None` lives in the incident-level
//! `collaborators` table and covers every patient; `Some(letter)` scopes the
//! grant to one patient via `patient_collaborators`.  The owner is implicit
//! from the incident record and is never stored here.

use rusqlite::{params, OptionalExtension};

use eprf_shared::{Collaborator, IncidentId, PatientLetter, RosterEntry, UserId};

use crate::database::Store;
use crate::encode::{column_dt, column_parse, encode_dt};
use crate::error::Result;

impl Store {
    /// Insert or overwrite a grant for the collaborator's scope.
    pub async fn upsert_collaborator(&self, grant: &Collaborator) -> Result<()> {
        let grant = grant.clone();
        self.call(move |conn| {
            match &grant.patient_letter {
                None => conn.execute(
                    "INSERT INTO collaborators
                         (incident_id, discord_id, callsign, permission, added_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (incident_id, discord_id)
                     DO UPDATE SET callsign = excluded.callsign,
                                   permission = excluded.permission,
                                   added_by = excluded.added_by",
                    params![
                        grant.incident_id.as_str(),
                        grant.discord_id.as_str(),
                        grant.callsign,
                        grant.permission.as_str(),
                        grant.added_by.as_str(),
                        encode_dt(grant.created_at),
                    ],
                )?,
                Some(patient) => conn.execute(
                    "INSERT INTO patient_collaborators
                         (incident_id, patient_letter, discord_id, callsign, permission,
                          added_by, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT (incident_id, patient_letter, discord_id)
                     DO UPDATE SET callsign = excluded.callsign,
                                   permission = excluded.permission,
                                   added_by = excluded.added_by",
                    params![
                        grant.incident_id.as_str(),
                        patient.as_str(),
                        grant.discord_id.as_str(),
                        grant.callsign,
                        grant.permission.as_str(),
                        grant.added_by.as_str(),
                        encode_dt(grant.created_at),
                    ],
                )?,
            };
            Ok(())
        })
        .await
    }

    /// Look up a single grant in the given scope.
    pub async fn find_collaborator(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        user: &UserId,
    ) -> Result<Option<Collaborator>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.map(|p| p.as_str().to_owned());
        let user = user.as_str().to_owned();
        self.call(move |conn| match patient {
            None => conn
                .query_row(
                    "SELECT incident_id, NULL, discord_id, callsign, permission,
                            added_by, created_at
                     FROM collaborators
                     WHERE incident_id = ?1 AND discord_id = ?2",
                    params![incident, user],
                    row_to_collaborator,
                )
                .optional(),
            Some(p) => conn
                .query_row(
                    "SELECT incident_id, patient_letter, discord_id, callsign, permission,
                            added_by, created_at
                     FROM patient_collaborators
                     WHERE incident_id = ?1 AND patient_letter = ?2 AND discord_id = ?3",
                    params![incident, p, user],
                    row_to_collaborator,
                )
                .optional(),
        })
        .await
    }

    /// Remove a grant.  Returns `false` when nothing matched.
    pub async fn remove_collaborator(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        user: &UserId,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.map(|p| p.as_str().to_owned());
        let user = user.as_str().to_owned();
        self.call(move |conn| {
            let affected = match patient {
                None => conn.execute(
                    "DELETE FROM collaborators WHERE incident_id = ?1 AND discord_id = ?2",
                    params![incident, user],
                )?,
                Some(p) => conn.execute(
                    "DELETE FROM patient_collaborators
                     WHERE incident_id = ?1 AND patient_letter = ?2 AND discord_id = ?3",
                    params![incident, p, user],
                )?,
            };
            Ok(affected > 0)
        })
        .await
    }

    /// All incident-level grants, oldest first.
    pub async fn list_collaborators(&self, incident_id: &IncidentId) -> Result<Vec<Collaborator>> {
        let incident = incident_id.as_str().to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT incident_id, NULL, discord_id, callsign, permission,
                        added_by, created_at
                 FROM collaborators
                 WHERE incident_id = ?1
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![incident], row_to_collaborator)?;
            rows.collect()
        })
        .await
    }

    /// All grants scoped to one patient, oldest first.
    pub async fn list_patient_collaborators(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
    ) -> Result<Vec<Collaborator>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT incident_id, patient_letter, discord_id, callsign, permission,
                        added_by, created_at
                 FROM patient_collaborators
                 WHERE incident_id = ?1 AND patient_letter = ?2
                 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![incident, patient], row_to_collaborator)?;
            rows.collect()
        })
        .await
    }

    /// Everyone mentionable in the incident's chat channels: the owner,
    /// patient authors, and collaborators of both scopes, deduplicated by id.
    pub async fn roster(&self, incident_id: &IncidentId) -> Result<Vec<RosterEntry>> {
        let incident = incident_id.as_str().to_owned();
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT discord_id, callsign FROM (
                     SELECT owner_id AS discord_id, owner_callsign AS callsign, 0 AS rank
                     FROM incidents WHERE incident_id = ?1
                     UNION
                     SELECT author_id, author_callsign, 1 FROM incidents WHERE incident_id = ?1
                     UNION
                     SELECT discord_id, callsign, 2 FROM collaborators WHERE incident_id = ?1
                     UNION
                     SELECT discord_id, callsign, 3
                     FROM patient_collaborators WHERE incident_id = ?1
                 )
                 GROUP BY discord_id
                 ORDER BY MIN(rank), discord_id",
            )?;
            let rows = stmt.query_map(params![incident], |row| {
                Ok(RosterEntry {
                    discord_id: UserId::new(row.get::<_, String>(0)?),
                    callsign: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
    }
}

fn row_to_collaborator(row: &rusqlite::Row<'_>) -> rusqlite::Result<Collaborator> {
    Ok(Collaborator {
        incident_id: IncidentId::new(row.get::<_, String>(0)?),
        patient_letter: row.get::<_, Option<String>>(1)?.map(PatientLetter::new),
        discord_id: UserId::new(row.get::<_, String>(2)?),
        callsign: row.get(3)?,
        permission: column_parse(row, 4)?,
        added_by: UserId::new(row.get::<_, String>(5)?),
        created_at: column_dt(row, 6)?,
    })
}
