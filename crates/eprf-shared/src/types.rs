use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// User identity = the account id handed to us by the chat platform
// (an opaque snowflake string). The backend never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Top-level case identifier. One incident may contain several patients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct IncidentId(pub String);

impl IncidentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IncidentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sub-identifier distinguishing multiple patients within one incident
/// ("A", "B", "C", ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PatientLetter(pub String);

impl PatientLetter {
    pub fn new(letter: impl Into<String>) -> Self {
        Self(letter.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatientLetter {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ordered permission lattice: `view < edit < manage < owner`.
///
/// The derived `Ord` relies on the declaration order below, so level
/// comparisons (`level >= PermissionLevel::Edit`) follow the lattice.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    View,
    Edit,
    Manage,
    Owner,
}

impl PermissionLevel {
    /// True iff the level may add, remove, or alter collaborators.
    pub fn can_manage_collaborators(self) -> bool {
        matches!(self, Self::Manage | Self::Owner)
    }

    /// True iff the level may mutate form data (and record versions).
    pub fn can_edit(self) -> bool {
        self >= Self::Edit
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Manage => "manage",
            Self::Owner => "owner",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "edit" => Ok(Self::Edit),
            "manage" => Ok(Self::Manage),
            "owner" => Ok(Self::Owner),
            other => Err(ParseEnumError::new("permission level", other)),
        }
    }
}

/// Which chat channel a message belongs to. Incident-wide chat and a
/// specific patient's chat are fully independent channels, even within the
/// same incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Incident,
    Patient,
}

impl ChatType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incident => "incident",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incident" => Ok(Self::Incident),
            "patient" => Ok(Self::Patient),
            other => Err(ParseEnumError::new("chat type", other)),
        }
    }
}

/// Lifecycle status of a patient record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Incomplete,
    Complete,
}

impl IncidentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IncidentStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incomplete" => Ok(Self::Incomplete),
            "complete" => Ok(Self::Complete),
            other => Err(ParseEnumError::new("incident status", other)),
        }
    }
}

/// Failed to parse one of the closed string enums above.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Deserialize an optional patient letter, treating the wire convention of
/// an empty string ("incident-wide") as `None`.
pub fn de_opt_patient_letter<'de, D>(de: D) -> Result<Option<PatientLetter>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw.filter(|s| !s.is_empty()).map(PatientLetter))
}
