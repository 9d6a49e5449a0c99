//! Timestamp fields that accept both RFC 3339 and naive ISO 8601 values.
//!
//! kdcli always writes RFC 3339 (UTC). Documents written by earlier tooling
//! carry local `YYYY-MM-DDTHH:MM:SS[.ffffff]` values without an offset;
//! those are read as UTC.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserialize, Deserializer};

const NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, NAIVE_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// `deserialize_with` for `DateTime<Utc>` fields.
pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
}

/// `deserialize_with` for `Option<DateTime<Utc>>` fields; `null` is `None`.
pub fn deserialize_option<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw))),
    }
}
