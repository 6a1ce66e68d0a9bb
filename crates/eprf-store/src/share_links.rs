use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use eprf_shared::{IncidentId, PatientLetter, ShareLink, UserId};

use crate::database::Store;
use crate::encode::{column_dt, column_parse, column_uuid, encode_dt};
use crate::error::Result;

impl Store {
    pub async fn insert_share_link(&self, link: &ShareLink) -> Result<()> {
        let link = link.clone();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO share_links
                     (token, incident_id, patient_letter, permission, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    link.token.to_string(),
                    link.incident_id.as_str(),
                    link.patient_letter.as_ref().map(|p| p.as_str().to_owned()),
                    link.permission.as_str(),
                    link.created_by.as_str(),
                    encode_dt(link.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn find_share_link(&self, token: Uuid) -> Result<Option<ShareLink>> {
        self.call(move |conn| {
            conn.query_row(
                "SELECT token, incident_id, patient_letter, permission, created_by, created_at
                 FROM share_links WHERE token = ?1",
                params![token.to_string()],
                row_to_share_link,
            )
            .optional()
        })
        .await
    }
}

fn row_to_share_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShareLink> {
    Ok(ShareLink {
        token: column_uuid(row, 0)?,
        incident_id: IncidentId::new(row.get::<_, String>(1)?),
        patient_letter: row.get::<_, Option<String>>(2)?.map(PatientLetter::new),
        permission: column_parse(row, 3)?,
        created_by: UserId::new(row.get::<_, String>(4)?),
        created_at: column_dt(row, 5)?,
    })
}
