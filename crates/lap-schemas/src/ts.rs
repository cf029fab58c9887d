//! Serde helpers for `Option<DateTime<Utc>>` fields.
//!
//! All persisted and wire timestamps are second-precision ISO-8601 UTC with a
//! trailing `Z` (`2023-10-02T12:23:59Z`).

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{self, Deserialize, Deserializer, Serializer};

const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(dt) => serializer.serialize_str(&dt.format(FORMAT).to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => {
            let naive = NaiveDateTime::parse_from_str(&s, FORMAT)
                .map_err(serde::de::Error::custom)?;
            Ok(Some(DateTime::from_naive_utc_and_offset(naive, Utc)))
        }
    }
}
