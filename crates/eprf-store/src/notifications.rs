use rusqlite::params;
use uuid::Uuid;

use eprf_shared::{IncidentId, Notification, PatientLetter, UserId};

use crate::database::Store;
use crate::encode::{column_dt, column_uuid, encode_dt};
use crate::error::Result;

const COLUMNS: &str = "id, target_id, kind, title, message, incident_id, patient_letter, \
     from_callsign, link, is_read, created_at";

impl Store {
    pub async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        let n = notification.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, target_id, kind, title, message, incident_id, patient_letter,
                      from_callsign, link, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    n.id.to_string(),
                    n.target_id.as_str(),
                    n.kind,
                    n.title,
                    n.message,
                    n.incident_id.as_ref().map(|i| i.as_str().to_owned()),
                    n.patient_letter.as_ref().map(|p| p.as_str().to_owned()),
                    n.from_callsign,
                    n.link,
                    n.is_read as i64,
                    encode_dt(n.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Notifications addressed to `target`, newest first.
    pub async fn list_notifications(
        &self,
        target: &UserId,
        unread_only: bool,
        limit: usize,
    ) -> Result<Vec<Notification>> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            let sql = if unread_only {
                format!(
                    "SELECT {COLUMNS} FROM notifications
                     WHERE target_id = ?1 AND is_read = 0
                     ORDER BY created_at DESC LIMIT ?2"
                )
            } else {
                format!(
                    "SELECT {COLUMNS} FROM notifications
                     WHERE target_id = ?1
                     ORDER BY created_at DESC LIMIT ?2"
                )
            };
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![target, limit as i64], row_to_notification)?;
            rows.collect()
        })
        .await
    }

    pub async fn unread_notification_count(&self, target: &UserId) -> Result<usize> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE target_id = ?1 AND is_read = 0",
                params![target],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    /// Mark one notification read.  Scoped to `target` so a user cannot
    /// touch someone else's rows by guessing ids.
    pub async fn mark_notification_read(&self, id: Uuid, target: &UserId) -> Result<bool> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            let affected = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND target_id = ?2",
                params![id.to_string(), target],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    pub async fn mark_all_notifications_read(&self, target: &UserId) -> Result<usize> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE target_id = ?1 AND is_read = 0",
                params![target],
            )
        })
        .await
    }

    pub async fn mark_notifications_read(&self, ids: &[Uuid], target: &UserId) -> Result<usize> {
        let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let mut affected = 0;
            {
                let mut stmt = tx.prepare(
                    "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND target_id = ?2",
                )?;
                for id in &ids {
                    affected += stmt.execute(params![id, target])?;
                }
            }
            tx.commit()?;
            Ok(affected)
        })
        .await
    }

    pub async fn delete_notification(&self, id: Uuid, target: &UserId) -> Result<bool> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            let affected = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND target_id = ?2",
                params![id.to_string(), target],
            )?;
            Ok(affected > 0)
        })
        .await
    }

    pub async fn delete_read_notifications(&self, target: &UserId) -> Result<usize> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM notifications WHERE target_id = ?1 AND is_read = 1",
                params![target],
            )
        })
        .await
    }

    pub async fn delete_all_notifications(&self, target: &UserId) -> Result<usize> {
        let target = target.as_str().to_owned();
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM notifications WHERE target_id = ?1",
                params![target],
            )
        })
        .await
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: column_uuid(row, 0)?,
        target_id: UserId::new(row.get::<_, String>(1)?),
        kind: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        incident_id: row.get::<_, Option<String>>(5)?.map(IncidentId::new),
        patient_letter: row.get::<_, Option<String>>(6)?.map(PatientLetter::new),
        from_callsign: row.get(7)?,
        link: row.get(8)?,
        is_read: row.get::<_, i64>(9)? != 0,
        created_at: column_dt(row, 10)?,
    })
}
