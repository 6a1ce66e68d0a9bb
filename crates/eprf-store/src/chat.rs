use rusqlite::params;

use eprf_shared::{ChatMessage, ChatType, IncidentId, PatientLetter, UserId};

use crate::database::Store;
use crate::encode::{column_dt, column_json, column_parse, column_uuid, encode_dt, encode_json};
use crate::error::Result;

impl Store {
    pub async fn insert_chat_message(&self, message: &ChatMessage) -> Result<()> {
        let message = message.clone();
        let mentions = encode_json(&message.mentions)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO chat_messages
                     (id, incident_id, patient_letter, chat_type, sender_id,
                      sender_callsign, text, mentions, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    message.id.to_string(),
                    message.incident_id.as_str(),
                    message.patient_letter.as_ref().map(|p| p.as_str().to_owned()),
                    message.chat_type.as_str(),
                    message.sender_id.as_str(),
                    message.sender_callsign,
                    message.text,
                    mentions,
                    encode_dt(message.created_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// The most recent `limit` messages in one chat scope, oldest first.
    ///
    /// `patient_letter` must be `None` for the incident-wide channel; the
    /// `IS` comparison keeps NULL-scoped rows separate from patient channels.
    pub async fn chat_history(
        &self,
        incident_id: &IncidentId,
        chat_type: ChatType,
        patient_letter: Option<&PatientLetter>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let incident = incident_id.as_str().to_owned();
        let patient = patient_letter.map(|p| p.as_str().to_owned());
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, incident_id, patient_letter, chat_type, sender_id,
                        sender_callsign, text, mentions, created_at
                 FROM chat_messages
                 WHERE incident_id = ?1 AND chat_type = ?2 AND patient_letter IS ?3
                 ORDER BY created_at DESC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![incident, chat_type.as_str(), patient, limit as i64],
                row_to_message,
            )?;
            let mut messages: Vec<ChatMessage> = rows.collect::<rusqlite::Result<_>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: column_uuid(row, 0)?,
        incident_id: IncidentId::new(row.get::<_, String>(1)?),
        patient_letter: row.get::<_, Option<String>>(2)?.map(PatientLetter::new),
        chat_type: column_parse(row, 3)?,
        sender_id: UserId::new(row.get::<_, String>(4)?),
        sender_callsign: row.get(5)?,
        text: row.get(6)?,
        mentions: column_json(row, 7)?,
        created_at: column_dt(row, 8)?,
    })
}
