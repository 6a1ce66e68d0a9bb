//! Encoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (millisecond
//! precision, `Z` suffix) so that lexicographic comparison in SQL matches
//! chronological order — staleness cutoffs and newest-first sorts run
//! directly on the text column. UUIDs are hyphenated lowercase strings;
//! structured fields (section documents, mention lists, diffs) are compact
//! JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub fn encode_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

pub fn encode_uuid(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn encode_json<T: serde::Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string(value)
}

// ---------------------------------------------------------------------------
// Row-mapper helpers
// ---------------------------------------------------------------------------
//
// Each helper reads one column and wraps decode failures in
// `FromSqlConversionFailure` so row mappers stay plain
// `fn(&Row) -> rusqlite::Result<T>` functions.

fn conversion_err<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn column_uuid(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn column_dt(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    decode_dt(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn column_opt_dt(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| decode_dt(&s).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn column_json<T: DeserializeOwned>(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn column_parse<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dt_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let encoded = encode_dt(dt);
        assert_eq!(encoded, "2026-03-14T09:26:53.000Z");
        assert_eq!(decode_dt(&encoded).unwrap(), dt);
    }

    #[test]
    fn test_dt_text_order_matches_time_order() {
        let earlier = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(encode_dt(earlier) < encode_dt(later));
    }
}
