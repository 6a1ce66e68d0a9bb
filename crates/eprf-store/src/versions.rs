//! Version history rows.  Append-only: the store exposes insert and read,
//! never update or delete — a restore appends its own entry.

use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use eprf_shared::{IncidentId, PatientLetter, UserId, VersionEntry};

use crate::database::Store;
use crate::encode::{column_dt, column_json, column_uuid, encode_dt, encode_json};
use crate::error::Result;

const COLUMNS: &str = "id, incident_id, patient_letter, section_name, changed_by, \
     changed_by_callsign, previous_data, new_data, diff_data, change_summary, created_at";

impl Store {
    pub async fn insert_version(&self, entry: &VersionEntry) -> Result<()> {
        let entry = entry.clone();
        let previous = encode_json(&entry.previous_data)?;
        let new = encode_json(&entry.new_data)?;
        let diff = encode_json(&entry.diff_data)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO versions
                     (id, incident_id, patient_letter, section_name, changed_by,
                      changed_by_callsign, previous_data, new_data, diff_data,
                      change_summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    entry.id.to_string(),
                    entry.incident_id.as_str(),
                    entry.patient_letter.as_str(),
                    entry.section_name,
                    entry.changed_by.as_str(),
                    entry.changed_by_callsign,
                    previous,
                    new,
                    diff,
                    entry.change_summary,
                    encode_dt(entry.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn find_version(&self, id: Uuid) -> Result<Option<VersionEntry>> {
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM versions WHERE id = ?1"),
                params![id.to_string()],
                row_to_version,
            )
            .optional()
        })
        .await
    }

    /// Version entries for an incident, newest first, optionally narrowed by
    /// patient and/or section.
    pub async fn list_versions(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        section_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<VersionEntry>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.map(|p| p.as_str().to_owned());
        let section = section_name.map(str::to_owned);
        self.call(move |conn| {
            let mut conditions = vec!["incident_id = ?1"];
            if patient.is_some() {
                conditions.push("patient_letter = ?2");
            }
            if section.is_some() {
                conditions.push("section_name = ?3");
            }

            let sql = format!(
                "SELECT {COLUMNS} FROM versions
                 WHERE {}
                 ORDER BY created_at DESC
                 LIMIT ?4",
                conditions.join(" AND ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![incident, patient, section, limit as i64],
                row_to_version,
            )?;
            rows.collect()
        })
        .await
    }
}

fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<VersionEntry> {
    Ok(VersionEntry {
        id: column_uuid(row, 0)?,
        incident_id: IncidentId::new(row.get::<_, String>(1)?),
        patient_letter: PatientLetter::new(row.get::<_, String>(2)?),
        section_name: row.get(3)?,
        changed_by: UserId::new(row.get::<_, String>(4)?),
        changed_by_callsign: row.get(5)?,
        previous_data: column_json(row, 6)?,
        new_data: column_json(row, 7)?,
        diff_data: column_json(row, 8)?,
        change_summary: row.get(9)?,
        created_at: column_dt(row, 10)?,
    })
}
