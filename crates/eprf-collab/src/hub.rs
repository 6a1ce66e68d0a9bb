//! In-process fan-out of live collaboration events.
//!
//! One broadcast channel carries every event; each subscriber filters down
//! to its own scope on the receive side.  Delivery is best-effort: a slow
//! subscriber that lags past the channel capacity loses the overwritten
//! events (acceptable — presence and cursors are idempotent upserts, and
//! chat history is re-fetchable), and publishing to zero subscribers is not
//! an error.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use eprf_shared::{ChatType, IncidentId, LiveEvent, PatientLetter};

/// A published event with its hub-assigned sequence number.
///
/// Sequence numbers are monotonic per hub and let a polling client resume
/// after the last envelope it saw.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub seq: u64,
    pub event: LiveEvent,
}

/// The scope one subscriber cares about: presence and cursor events for a
/// single `(incident, patient)`, plus chat and typing events for exactly one
/// chat channel.
#[derive(Debug, Clone)]
pub struct EventScope {
    pub incident_id: IncidentId,
    pub patient_letter: PatientLetter,
    pub chat_type: ChatType,
    /// Patient of the chat channel; `None` for the incident-wide channel.
    pub chat_patient: Option<PatientLetter>,
}

impl EventScope {
    pub fn matches(&self, event: &LiveEvent) -> bool {
        if event.incident_id() != &self.incident_id {
            return false;
        }
        match event {
            LiveEvent::ChatMessage(msg) => {
                msg.chat_type == self.chat_type && msg.patient_letter == self.chat_patient
            }
            LiveEvent::Typing(ping) => {
                ping.chat_type == self.chat_type && ping.patient_letter == self.chat_patient
            }
            // Presence and cursor events follow the patient being viewed.
            _ => event.patient_letter() == Some(&self.patient_letter),
        }
    }
}

/// Broadcast hub shared by every session and request handler.
pub struct EventHub {
    tx: broadcast::Sender<Envelope>,
    seq: AtomicU64,
}

impl EventHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: AtomicU64::new(0),
        }
    }

    /// Publish an event to every current subscriber.  Never blocks; returns
    /// the sequence number assigned to the event.
    pub fn publish(&self, event: LiveEvent) -> u64 {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(seq, kind = event.kind(), incident = %event.incident_id(), "publish");
        // Send fails only when nobody is subscribed, which is fine.
        let _ = self.tx.send(Envelope { seq, event });
        seq
    }

    /// Sequence number of the most recently published event.
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self, scope: EventScope) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            scope,
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// One subscriber's filtered view of the hub.
pub struct EventSubscription {
    rx: broadcast::Receiver<Envelope>,
    scope: EventScope,
}

impl EventSubscription {
    /// Next event in this subscription's scope, or `None` once the hub is
    /// gone.  Lagged windows are skipped silently.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if self.scope.matches(&envelope.event) => return Some(envelope),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "subscriber lagged, events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eprf_shared::events::{PresenceLeave, TypingPing};
    use eprf_shared::UserId;

    fn scope(incident: &str, patient: &str, chat_type: ChatType) -> EventScope {
        EventScope {
            incident_id: IncidentId::from(incident),
            patient_letter: PatientLetter::from(patient),
            chat_type,
            chat_patient: match chat_type {
                ChatType::Incident => None,
                ChatType::Patient => Some(PatientLetter::from(patient)),
            },
        }
    }

    fn presence_leave(incident: &str, patient: &str) -> LiveEvent {
        LiveEvent::PresenceLeave(PresenceLeave {
            incident_id: IncidentId::from(incident),
            patient_letter: PatientLetter::from(patient),
            discord_id: UserId::from("100"),
        })
    }

    #[tokio::test]
    async fn test_subscriber_sees_only_its_scope() {
        let hub = EventHub::default();
        let mut sub = hub.subscribe(scope("INC-1", "A", ChatType::Incident));

        hub.publish(presence_leave("INC-2", "A")); // other incident
        hub.publish(presence_leave("INC-1", "B")); // other patient
        hub.publish(presence_leave("INC-1", "A"));

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.seq, 3);
        assert_eq!(envelope.event.kind(), "presence-leave");
    }

    #[tokio::test]
    async fn test_typing_filtered_by_chat_scope() {
        let hub = EventHub::default();
        let mut sub = hub.subscribe(scope("INC-1", "A", ChatType::Patient));

        // Incident-wide typing must not leak into the patient channel.
        hub.publish(LiveEvent::Typing(TypingPing {
            incident_id: IncidentId::from("INC-1"),
            patient_letter: None,
            chat_type: ChatType::Incident,
            discord_id: UserId::from("100"),
            callsign: "Medic 1".to_string(),
        }));
        hub.publish(LiveEvent::Typing(TypingPing {
            incident_id: IncidentId::from("INC-1"),
            patient_letter: Some(PatientLetter::from("A")),
            chat_type: ChatType::Patient,
            discord_id: UserId::from("100"),
            callsign: "Medic 1".to_string(),
        }));

        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.seq, 2);
    }

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let hub = EventHub::default();
        assert_eq!(hub.publish(presence_leave("INC-1", "A")), 1);
        assert_eq!(hub.last_seq(), 1);
    }
}
