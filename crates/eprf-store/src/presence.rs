//! Presence heartbeats and cursor focus rows.
//!
//! Both tables are advisory, idempotent upserts keyed by
//! `(incident, patient, user)`.  Queries take an explicit staleness cutoff so
//! the caller decides the window; rows past the cutoff are invisible even
//! when a leave event was lost, and a periodic prune deletes them for good.

use chrono::{DateTime, Utc};
use rusqlite::params;

use eprf_shared::{CursorEntry, IncidentId, PatientLetter, PresenceEntry, UserId};

use crate::database::Store;
use crate::encode::{column_dt, encode_dt};
use crate::error::Result;

impl Store {
    pub async fn upsert_presence(&self, entry: &PresenceEntry) -> Result<()> {
        let entry = entry.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO presence
                     (incident_id, patient_letter, discord_id, callsign, page, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (incident_id, patient_letter, discord_id)
                 DO UPDATE SET callsign = excluded.callsign,
                               page = excluded.page,
                               last_seen = excluded.last_seen",
                params![
                    entry.incident_id.as_str(),
                    entry.patient_letter.as_str(),
                    entry.discord_id.as_str(),
                    entry.callsign,
                    entry.page,
                    encode_dt(entry.last_seen),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_presence(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let user = user.as_str().to_owned();
        self.call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM presence
                 WHERE incident_id = ?1 AND patient_letter = ?2 AND discord_id = ?3",
                params![incident, patient, user],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    /// Viewers seen at or after `cutoff`, most recent heartbeat first.
    pub async fn active_presence(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PresenceEntry>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let cutoff = encode_dt(cutoff);
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT incident_id, patient_letter, discord_id, callsign, page, last_seen
                 FROM presence
                 WHERE incident_id = ?1 AND patient_letter = ?2 AND last_seen >= ?3
                 ORDER BY last_seen DESC",
            )?;
            let rows = stmt.query_map(params![incident, patient, cutoff], row_to_presence)?;
            rows.collect()
        })
        .await
    }

    /// Delete presence rows older than `cutoff` across all incidents.
    pub async fn prune_presence(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = encode_dt(cutoff);
        self.call(move |conn| {
            conn.execute("DELETE FROM presence WHERE last_seen < ?1", params![cutoff])
        })
        .await
    }

    pub async fn upsert_cursor(&self, entry: &CursorEntry) -> Result<()> {
        let entry = entry.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO cursors
                     (incident_id, patient_letter, discord_id, callsign, field_name,
                      color, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (incident_id, patient_letter, discord_id)
                 DO UPDATE SET callsign = excluded.callsign,
                               field_name = excluded.field_name,
                               color = excluded.color,
                               updated_at = excluded.updated_at",
                params![
                    entry.incident_id.as_str(),
                    entry.patient_letter.as_str(),
                    entry.discord_id.as_str(),
                    entry.callsign,
                    entry.field_name,
                    entry.color,
                    encode_dt(entry.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn remove_cursor(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        user: &UserId,
    ) -> Result<bool> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let user = user.as_str().to_owned();
        self.call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM cursors
                 WHERE incident_id = ?1 AND patient_letter = ?2 AND discord_id = ?3",
                params![incident, patient, user],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    /// Cursors updated at or after `cutoff`, excluding blurred (empty-field)
    /// rows — peers stop rendering an indicator for those.
    pub async fn active_cursors(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<CursorEntry>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let cutoff = encode_dt(cutoff);
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT incident_id, patient_letter, discord_id, callsign, field_name,
                        color, updated_at
                 FROM cursors
                 WHERE incident_id = ?1 AND patient_letter = ?2
                   AND updated_at >= ?3 AND field_name != ''
                 ORDER BY updated_at DESC",
            )?;
            let rows = stmt.query_map(params![incident, patient, cutoff], row_to_cursor)?;
            rows.collect()
        })
        .await
    }

    /// Delete cursor rows older than `cutoff` across all incidents.
    pub async fn prune_cursors(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cutoff = encode_dt(cutoff);
        self.call(move |conn| {
            conn.execute("DELETE FROM cursors WHERE updated_at < ?1", params![cutoff])
        })
        .await
    }
}

fn row_to_presence(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresenceEntry> {
    Ok(PresenceEntry {
        incident_id: IncidentId::new(row.get::<_, String>(0)?),
        patient_letter: PatientLetter::new(row.get::<_, String>(1)?),
        discord_id: UserId::new(row.get::<_, String>(2)?),
        callsign: row.get(3)?,
        page: row.get(4)?,
        last_seen: column_dt(row, 5)?,
    })
}

fn row_to_cursor(row: &rusqlite::Row<'_>) -> rusqlite::Result<CursorEntry> {
    Ok(CursorEntry {
        incident_id: IncidentId::new(row.get::<_, String>(0)?),
        patient_letter: PatientLetter::new(row.get::<_, String>(1)?),
        discord_id: UserId::new(row.get::<_, String>(2)?),
        callsign: row.get(3)?,
        field_name: row.get(4)?,
        color: row.get(5)?,
        updated_at: column_dt(row, 6)?,
    })
}
