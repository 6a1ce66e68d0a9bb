use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use eprf_shared::{IncidentId, PatientLetter, SectionDocument};

use crate::database::Store;
use crate::encode::{encode_dt, encode_json};
use crate::error::Result;

impl Store {
    /// Save a section document, fully overwriting any previous save for the
    /// same `(incident, patient, section)` triple (last-write-wins).
    pub async fn upsert_section(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        section_name: &str,
        data: &SectionDocument,
    ) -> Result<()> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let section = section_name.to_owned();
        let json = encode_json(data)?;
        let now = encode_dt(Utc::now());
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO sections (incident_id, patient_letter, section_name, data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (incident_id, patient_letter, section_name)
                 DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
                params![incident, patient, section, json, now],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_section(
        &self,
        incident_id: &IncidentId,
        patient_letter: &PatientLetter,
        section_name: &str,
    ) -> Result<Option<SectionDocument>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.as_str().to_owned();
        let section = section_name.to_owned();
        let raw: Option<String> = self
            .call(move |conn| {
                conn.query_row(
                    "SELECT data FROM sections
                     WHERE incident_id = ?1 AND patient_letter = ?2 AND section_name = ?3",
                    params![incident, patient, section],
                    |row| row.get(0),
                )
                .optional()
            })
            .await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> SectionDocument {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_section_upsert_overwrites() {
        let store = Store::open_in_memory().await.unwrap();
        let incident = IncidentId::from("INC-1");
        let patient = PatientLetter::from("A");

        store
            .upsert_section(&incident, &patient, "vitals", &doc(json!({"hr": 80})))
            .await
            .unwrap();
        store
            .upsert_section(&incident, &patient, "vitals", &doc(json!({"hr": 90})))
            .await
            .unwrap();

        let saved = store
            .get_section(&incident, &patient, "vitals")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved, doc(json!({"hr": 90})));
    }

    #[tokio::test]
    async fn test_missing_section_is_none() {
        let store = Store::open_in_memory().await.unwrap();
        let found = store
            .get_section(&IncidentId::from("INC-1"), &PatientLetter::from("A"), "vitals")
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
