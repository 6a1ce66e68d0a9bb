//! # eprf-shared
//!
//! Domain types shared across the ePRF collaboration backend: identifiers,
//! the ordered permission lattice, persisted entity models, live-event
//! payloads, the opaque section document with its structural diff, cursor
//! colors, and protocol constants.
//!
//! Every struct derives `Serialize`/`Deserialize` with camelCase field names
//! so the same shapes serve as storage models, broadcast payloads, and API
//! response bodies.

pub mod color;
pub mod constants;
pub mod document;
pub mod events;
pub mod models;
pub mod types;

pub use document::{compute_diff, DocumentDiff, FieldChange, SectionDocument};
pub use events::LiveEvent;
pub use models::*;
pub use types::{ChatType, IncidentId, IncidentStatus, PatientLetter, PermissionLevel, UserId};
