//! Chat with mention resolution.
//!
//! Messages are scoped to an incident-wide or per-patient channel; the two
//! are fully independent even within one incident.  Mention tokens are
//! `@` followed by word characters only — callsigns containing spaces or
//! hyphens cannot be mentioned, a known limitation carried deliberately.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use eprf_shared::constants::{CHAT_HISTORY_LIMIT, MENTION_PREVIEW_CHARS};
use eprf_shared::events::TypingPing;
use eprf_shared::{ChatMessage, ChatType, IncidentId, LiveEvent, PatientLetter, RosterEntry, UserId};
use eprf_store::Store;

use crate::error::{CollabError, Result};
use crate::hub::EventHub;
use crate::notify::NotificationService;

#[derive(Clone)]
pub struct ChatService {
    store: Store,
    hub: Arc<EventHub>,
    notifications: NotificationService,
}

impl ChatService {
    pub fn new(store: Store, hub: Arc<EventHub>, notifications: NotificationService) -> Self {
        Self {
            store,
            hub,
            notifications,
        }
    }

    /// Post a message: resolve mentions against the incident roster, persist,
    /// notify every mentioned user except the sender, and broadcast to the
    /// channel's subscribers.
    pub async fn post_message(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        chat_type: ChatType,
        sender: &UserId,
        sender_callsign: &str,
        text: &str,
    ) -> Result<ChatMessage> {
        if text.trim().is_empty() {
            return Err(CollabError::Validation("message text is required".to_string()));
        }
        validate_chat_scope(chat_type, patient_letter)?;

        let roster = self.store.roster(incident_id).await?;
        let mentions = extract_mentions(text, &roster);

        let message = ChatMessage {
            id: Uuid::new_v4(),
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.cloned(),
            chat_type,
            sender_id: sender.clone(),
            sender_callsign: sender_callsign.to_string(),
            text: text.to_string(),
            mentions: mentions.clone(),
            created_at: Utc::now(),
        };
        self.store.insert_chat_message(&message).await?;

        let preview = preview(text);
        for mentioned in &mentions {
            if mentioned != sender {
                self.notifications
                    .notify_mention(mentioned, incident_id, patient_letter, sender_callsign, &preview)
                    .await;
            }
        }

        self.hub.publish(LiveEvent::ChatMessage(message.clone()));
        Ok(message)
    }

    /// The most recent 50 messages of one channel, oldest first.  A finite
    /// snapshot — later messages arrive via the live subscription, not by
    /// re-fetching.
    pub async fn history(
        &self,
        incident_id: &IncidentId,
        chat_type: ChatType,
        patient_letter: Option<&PatientLetter>,
    ) -> Result<Vec<ChatMessage>> {
        validate_chat_scope(chat_type, patient_letter)?;
        Ok(self
            .store
            .chat_history(incident_id, chat_type, patient_letter, CHAT_HISTORY_LIMIT)
            .await?)
    }

    /// Broadcast a typing indicator.  Never persisted; receivers clear it
    /// after a few seconds of silence or on message arrival.
    pub fn typing(
        &self,
        incident_id: &IncidentId,
        patient_letter: Option<&PatientLetter>,
        chat_type: ChatType,
        sender: &UserId,
        sender_callsign: &str,
    ) -> Result<()> {
        validate_chat_scope(chat_type, patient_letter)?;
        self.hub.publish(LiveEvent::Typing(TypingPing {
            incident_id: incident_id.clone(),
            patient_letter: patient_letter.cloned(),
            chat_type,
            discord_id: sender.clone(),
            callsign: sender_callsign.to_string(),
        }));
        Ok(())
    }
}

fn validate_chat_scope(chat_type: ChatType, patient_letter: Option<&PatientLetter>) -> Result<()> {
    match (chat_type, patient_letter) {
        (ChatType::Patient, None) => Err(CollabError::Validation(
            "patient chat requires a patient letter".to_string(),
        )),
        (ChatType::Incident, Some(_)) => Err(CollabError::Validation(
            "incident chat takes no patient letter".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Scan `text` for `@<word>` tokens and resolve them against the roster,
/// case-insensitively.  Matches are returned in order of appearance with
/// duplicates preserved; tokens matching no callsign are ignored (they stay
/// literal text, not broken mentions).
pub fn extract_mentions(text: &str, roster: &[RosterEntry]) -> Vec<UserId> {
    let mut mentions = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if c != '@' {
            continue;
        }
        let mut token = String::new();
        while let Some(&(_, next)) = chars.peek() {
            if next.is_ascii_alphanumeric() || next == '_' {
                token.push(next);
                chars.next();
            } else {
                break;
            }
        }
        if token.is_empty() {
            continue;
        }
        if let Some(member) = roster
            .iter()
            .find(|entry| entry.callsign.eq_ignore_ascii_case(&token))
        {
            mentions.push(member.discord_id.clone());
        }
    }

    mentions
}

/// Notification preview: the first 100 characters, with an ellipsis marker
/// when truncated.
fn preview(text: &str) -> String {
    if text.chars().count() <= MENTION_PREVIEW_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(MENTION_PREVIEW_CHARS).collect();
        cut.push_str("...");
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<RosterEntry> {
        vec![
            RosterEntry {
                discord_id: UserId::from("id1"),
                callsign: "Alice".to_string(),
            },
            RosterEntry {
                discord_id: UserId::from("id2"),
                callsign: "Bob".to_string(),
            },
        ]
    }

    #[test]
    fn test_mentions_ordered_case_insensitive_with_duplicates() {
        let mentions = extract_mentions("ping @Alice and @bob, see @Alice", &roster());
        assert_eq!(
            mentions,
            vec![UserId::from("id1"), UserId::from("id2"), UserId::from("id1")]
        );
    }

    #[test]
    fn test_unmatched_token_is_ignored() {
        let mentions = extract_mentions("hey @Charlie, @Alice knows", &roster());
        assert_eq!(mentions, vec![UserId::from("id1")]);
    }

    #[test]
    fn test_word_characters_only() {
        // A hyphenated callsign cannot be mentioned; the token stops at '-'.
        let roster = vec![RosterEntry {
            discord_id: UserId::from("id3"),
            callsign: "Medic-1".to_string(),
        }];
        assert!(extract_mentions("calling @Medic-1", &roster).is_empty());

        // Underscores are word characters.
        let roster = vec![RosterEntry {
            discord_id: UserId::from("id4"),
            callsign: "Medic_1".to_string(),
        }];
        assert_eq!(
            extract_mentions("calling @medic_1", &roster),
            vec![UserId::from("id4")]
        );
    }

    #[test]
    fn test_bare_at_sign_is_not_a_mention() {
        assert!(extract_mentions("see you @ the RV point", &roster()).is_empty());
    }

    #[test]
    fn test_preview_truncation() {
        let short = "all clear";
        assert_eq!(preview(short), short);

        let long = "x".repeat(150);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), MENTION_PREVIEW_CHARS + 3);
        assert!(cut.ends_with("..."));
    }

    mod service {
        use super::*;
        use crate::hub::{EventHub, EventScope};
        use chrono::Utc;
        use eprf_shared::{IncidentRecord, IncidentStatus};

        async fn fixture() -> (Store, Arc<EventHub>, ChatService) {
            let store = Store::open_in_memory().await.unwrap();
            let now = Utc::now();
            store
                .insert_incident(&IncidentRecord {
                    incident_id: IncidentId::from("INC-1"),
                    patient_letter: PatientLetter::from("A"),
                    status: IncidentStatus::Incomplete,
                    author_id: UserId::from("100"),
                    author_callsign: "Alice".to_string(),
                    owner_id: UserId::from("100"),
                    owner_callsign: "Alice".to_string(),
                    fleet_id: None,
                    created_at: now,
                    updated_at: now,
                    submitted_at: None,
                })
                .await
                .unwrap();

            let hub = Arc::new(EventHub::default());
            let notifications = NotificationService::new(store.clone());
            let chat = ChatService::new(store.clone(), hub.clone(), notifications);
            (store, hub, chat)
        }

        #[tokio::test]
        async fn test_post_persists_notifies_and_broadcasts() {
            let (store, hub, chat) = fixture().await;
            let incident = IncidentId::from("INC-1");

            let mut sub = hub.subscribe(EventScope {
                incident_id: incident.clone(),
                patient_letter: PatientLetter::from("A"),
                chat_type: ChatType::Incident,
                chat_patient: None,
            });

            let message = chat
                .post_message(
                    &incident,
                    None,
                    ChatType::Incident,
                    &UserId::from("200"),
                    "Bob",
                    "@Alice patient A is ready",
                )
                .await
                .unwrap();
            assert_eq!(message.mentions, vec![UserId::from("100")]);

            // Broadcast reached the channel's subscriber.
            let envelope = sub.recv().await.unwrap();
            assert_eq!(envelope.event.kind(), "chat-message");

            // The mentioned owner got a notification; the sender did not.
            let count = store
                .unread_notification_count(&UserId::from("100"))
                .await
                .unwrap();
            assert_eq!(count, 1);
            assert_eq!(
                store
                    .unread_notification_count(&UserId::from("200"))
                    .await
                    .unwrap(),
                0
            );

            let history = chat.history(&incident, ChatType::Incident, None).await.unwrap();
            assert_eq!(history.len(), 1);
        }

        #[tokio::test]
        async fn test_self_mention_does_not_notify() {
            let (store, _hub, chat) = fixture().await;

            chat.post_message(
                &IncidentId::from("INC-1"),
                None,
                ChatType::Incident,
                &UserId::from("100"),
                "Alice",
                "note to self: @Alice check vitals",
            )
            .await
            .unwrap();

            assert_eq!(
                store
                    .unread_notification_count(&UserId::from("100"))
                    .await
                    .unwrap(),
                0
            );
        }

        #[tokio::test]
        async fn test_scope_validation() {
            let (_store, _hub, chat) = fixture().await;
            let incident = IncidentId::from("INC-1");

            let err = chat
                .post_message(
                    &incident,
                    None,
                    ChatType::Patient,
                    &UserId::from("100"),
                    "Alice",
                    "hello",
                )
                .await;
            assert!(matches!(err, Err(CollabError::Validation(_))));

            let err = chat
                .post_message(
                    &incident,
                    Some(&PatientLetter::from("A")),
                    ChatType::Incident,
                    &UserId::from("100"),
                    "Alice",
                    "hello",
                )
                .await;
            assert!(matches!(err, Err(CollabError::Validation(_))));
        }
    }
}
