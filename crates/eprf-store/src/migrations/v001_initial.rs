//! v001 -- Initial schema creation.
//!
//! Creates the nine core tables: `incidents`, `sections`, `collaborators`,
//! `patient_collaborators`, `presence`, `cursors`, `chat_messages`,
//! `notifications`, `versions`, and `share_links`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Incident records (one row per patient within an incident)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS incidents (
    incident_id     TEXT NOT NULL,
    patient_letter  TEXT NOT NULL,
    status          TEXT NOT NULL,               -- 'incomplete' | 'complete'
    author_id       TEXT NOT NULL,               -- discord id of the patient author
    author_callsign TEXT NOT NULL,
    owner_id        TEXT NOT NULL,               -- discord id of the incident owner
    owner_callsign  TEXT NOT NULL,
    fleet_id        TEXT,
    created_at      TEXT NOT NULL,               -- RFC-3339
    updated_at      TEXT NOT NULL,
    submitted_at    TEXT,

    PRIMARY KEY (incident_id, patient_letter)
);

CREATE INDEX IF NOT EXISTS idx_incidents_owner  ON incidents(owner_id);
CREATE INDEX IF NOT EXISTS idx_incidents_author ON incidents(author_id);

-- ----------------------------------------------------------------
-- Section documents (opaque JSON per form section)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS sections (
    incident_id    TEXT NOT NULL,
    patient_letter TEXT NOT NULL,
    section_name   TEXT NOT NULL,
    data           TEXT NOT NULL,                -- JSON object
    updated_at     TEXT NOT NULL,

    PRIMARY KEY (incident_id, patient_letter, section_name)
);

-- ----------------------------------------------------------------
-- Incident-level collaborator grants (owner is implicit, never stored)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS collaborators (
    incident_id TEXT NOT NULL,
    discord_id  TEXT NOT NULL,
    callsign    TEXT NOT NULL,
    permission  TEXT NOT NULL,                   -- 'view' | 'edit' | 'manage'
    added_by    TEXT NOT NULL,
    created_at  TEXT NOT NULL,

    PRIMARY KEY (incident_id, discord_id)
);

-- ----------------------------------------------------------------
-- Patient-level collaborator grants
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS patient_collaborators (
    incident_id    TEXT NOT NULL,
    patient_letter TEXT NOT NULL,
    discord_id     TEXT NOT NULL,
    callsign       TEXT NOT NULL,
    permission     TEXT NOT NULL,
    added_by       TEXT NOT NULL,
    created_at     TEXT NOT NULL,

    PRIMARY KEY (incident_id, patient_letter, discord_id)
);

-- ----------------------------------------------------------------
-- Presence (heartbeat-refreshed viewers)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS presence (
    incident_id    TEXT NOT NULL,
    patient_letter TEXT NOT NULL,
    discord_id     TEXT NOT NULL,
    callsign       TEXT NOT NULL,
    page           TEXT NOT NULL,
    last_seen      TEXT NOT NULL,

    PRIMARY KEY (incident_id, patient_letter, discord_id)
);

CREATE INDEX IF NOT EXISTS idx_presence_last_seen ON presence(last_seen);

-- ----------------------------------------------------------------
-- Cursors (one focused field per user per patient scope)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS cursors (
    incident_id    TEXT NOT NULL,
    patient_letter TEXT NOT NULL,
    discord_id     TEXT NOT NULL,
    callsign       TEXT NOT NULL,
    field_name     TEXT NOT NULL,                -- '' records a blur
    color          TEXT NOT NULL,
    updated_at     TEXT NOT NULL,

    PRIMARY KEY (incident_id, patient_letter, discord_id)
);

CREATE INDEX IF NOT EXISTS idx_cursors_updated ON cursors(updated_at);

-- ----------------------------------------------------------------
-- Chat messages (immutable; patient_letter NULL = incident-wide channel)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chat_messages (
    id              TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    incident_id     TEXT NOT NULL,
    patient_letter  TEXT,
    chat_type       TEXT NOT NULL,               -- 'incident' | 'patient'
    sender_id       TEXT NOT NULL,
    sender_callsign TEXT NOT NULL,
    text            TEXT NOT NULL,
    mentions        TEXT NOT NULL,               -- JSON array of discord ids
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chat_scope
    ON chat_messages(incident_id, chat_type, patient_letter, created_at DESC);

-- ----------------------------------------------------------------
-- Notifications
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS notifications (
    id             TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    target_id      TEXT NOT NULL,
    kind           TEXT NOT NULL,                -- 'mention', 'collaborator_added', ...
    title          TEXT NOT NULL,
    message        TEXT NOT NULL,
    incident_id    TEXT,
    patient_letter TEXT,
    from_callsign  TEXT,
    link           TEXT,
    is_read        INTEGER NOT NULL DEFAULT 0,   -- boolean 0/1
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_target
    ON notifications(target_id, created_at DESC);

-- ----------------------------------------------------------------
-- Version history (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS versions (
    id                  TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    incident_id         TEXT NOT NULL,
    patient_letter      TEXT NOT NULL,
    section_name        TEXT NOT NULL,
    changed_by          TEXT NOT NULL,
    changed_by_callsign TEXT NOT NULL,
    previous_data       TEXT NOT NULL,              -- JSON object
    new_data            TEXT NOT NULL,              -- JSON object
    diff_data           TEXT NOT NULL,              -- JSON diff or restore marker
    change_summary      TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_versions_scope
    ON versions(incident_id, patient_letter, section_name, created_at DESC);

-- ----------------------------------------------------------------
-- Share links (opaque capability tokens)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS share_links (
    token          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    incident_id    TEXT NOT NULL,
    patient_letter TEXT,
    permission     TEXT NOT NULL,
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
