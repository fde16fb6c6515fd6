//! Serde adapter for optional visit times.
//!
//! Written as `HH:MM:SS` so lexical order in the store equals clock order.
//! Accepts `HH:MM` on input, which is what form time pickers send.

use chrono::NaiveTime;
use serde::{Deserialize, Deserializer, Serializer};

const STORED: &str = "%H:%M:%S";

pub fn serialize<S>(value: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(t) => serializer.serialize_str(&t.format(STORED).to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse(s).map(Some).map_err(serde::de::Error::custom),
    }
}

pub fn parse(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("invalid time of day: {s}"))
}
