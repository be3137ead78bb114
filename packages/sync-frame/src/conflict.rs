//! Conflict detection and resolution for upserts that changed on both
//! sides since the last sync.
//!
//! Timestamp extraction checks a fixed list of field names, in priority
//! order, and accepts either a numeric epoch-millisecond value or an
//! ISO-8601 string.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::ConflictPolicy;
use crate::model::Record;

const TIMESTAMP_FIELDS: &[&str] = &[
    "updatedAt",
    "updated_at",
    "updatedOn",
    "updated_on",
    "lastModified",
    "last_modified",
    "modifiedAt",
    "modified_at",
];

/// Extract a comparable timestamp from a record's fields, trying each
/// known field name in priority order and returning the first one that
/// parses.
pub fn extract_timestamp(record: &Record) -> Option<DateTime<Utc>> {
    TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| record.fields.get(*field).and_then(parse_timestamp_value))
}

fn parse_timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let millis = n.as_i64()?;
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

/// Permissive ISO-8601 parsing: a full RFC3339 timestamp with offset is
/// tried first, then the common offset-less forms a writer might emit
/// (`YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, date-only), assumed UTC.
fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// The outcome of resolving one conflicting upsert.
pub enum Resolution {
    /// The source record should be pushed to the destination.
    TakeSource,
    /// The destination already holds the winning value; skip the push.
    TakeDest,
    /// Under the `manual` policy: record the conflict and skip.
    Defer,
}

/// Decide which side wins for an upsert seen on both `src` and `dest`
/// since the last sync, per `policy`.
///
/// Under `last_writer_wins`, the side with the newer extractable
/// timestamp wins; ties, and records where either side lacks an
/// extractable timestamp, favor the source (the side the change was
/// detected on).
pub fn resolve(policy: ConflictPolicy, src: &Record, dest: &Record) -> Resolution {
    match policy {
        ConflictPolicy::Manual => Resolution::Defer,
        ConflictPolicy::LastWriterWins => {
            match (extract_timestamp(src), extract_timestamp(dest)) {
                (Some(src_ts), Some(dest_ts)) if dest_ts > src_ts => Resolution::TakeDest,
                _ => Resolution::TakeSource,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(field: &str, value: Value) -> Record {
        Record::new("r1").with_field(field, value)
    }

    #[test]
    fn extracts_epoch_millis() {
        let record = record_with("updatedAt", json!(1_700_000_000_000i64));
        assert!(extract_timestamp(&record).is_some());
    }

    #[test]
    fn extracts_iso8601_string() {
        let record = record_with("updated_at", json!("2024-01-01T00:00:00Z"));
        assert!(extract_timestamp(&record).is_some());
    }

    #[test]
    fn extracts_offset_less_and_date_only_forms() {
        assert!(parse_timestamp_str("2024-01-01T00:00:00").is_some());
        assert!(parse_timestamp_str("2024-01-01 00:00:00").is_some());
        assert!(parse_timestamp_str("2024-01-01").is_some());
        assert!(parse_timestamp_str("not a date").is_none());
    }

    #[test]
    fn prefers_first_matching_field_name() {
        let record = Record::new("r1")
            .with_field("modifiedAt", json!(1_000))
            .with_field("updatedAt", json!(2_000));
        let ts = extract_timestamp(&record).unwrap();
        assert_eq!(ts, DateTime::from_timestamp_millis(2_000).unwrap());
    }

    #[test]
    fn missing_timestamp_yields_none() {
        let record = Record::new("r1");
        assert!(extract_timestamp(&record).is_none());
    }

    #[test]
    fn lww_newer_destination_wins() {
        let src = record_with("updatedAt", json!(1_000));
        let dest = record_with("updatedAt", json!(2_000));
        assert!(matches!(
            resolve(ConflictPolicy::LastWriterWins, &src, &dest),
            Resolution::TakeDest
        ));
    }

    #[test]
    fn lww_tie_favors_source() {
        let src = record_with("updatedAt", json!(1_000));
        let dest = record_with("updatedAt", json!(1_000));
        assert!(matches!(
            resolve(ConflictPolicy::LastWriterWins, &src, &dest),
            Resolution::TakeSource
        ));
    }

    #[test]
    fn lww_missing_timestamp_favors_source() {
        let src = Record::new("r1");
        let dest = record_with("updatedAt", json!(2_000));
        assert!(matches!(
            resolve(ConflictPolicy::LastWriterWins, &src, &dest),
            Resolution::TakeSource
        ));
    }

    #[test]
    fn manual_policy_always_defers() {
        let src = record_with("updatedAt", json!(1_000));
        let dest = record_with("updatedAt", json!(2_000));
        assert!(matches!(resolve(ConflictPolicy::Manual, &src, &dest), Resolution::Defer));
    }
}
