//! Real-time collaboration engines for multi-user patient report forms.
//!
//! Everything here is transport-agnostic: the HTTP layer translates requests
//! into calls on these engines and relays hub events back out.  [`Collab`]
//! is the composition root; [`Collab::join`] opens a per-user
//! [`CollabSession`] on one patient form.

pub mod access;
pub mod chat;
pub mod error;
pub mod history;
pub mod hub;
pub mod notify;
pub mod presence;
pub mod records;
pub mod session;
pub mod sharing;

pub use access::AccessControl;
pub use chat::ChatService;
pub use error::{CollabError, Result};
pub use history::HistoryEngine;
pub use hub::{Envelope, EventHub, EventScope, EventSubscription};
pub use notify::{NotificationList, NotificationService};
pub use presence::PresenceTracker;
pub use records::RecordsService;
pub use session::{Collab, CollabSession};
pub use sharing::SharingService;
