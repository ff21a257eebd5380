// src/types/date.rs

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseError;

/// A timestamp as Parse Server sends it: an ISO 8601 string with millisecond precision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDate {
    pub iso: String,
}

impl ParseDate {
    pub fn new(iso_string: String) -> Self {
        ParseDate { iso: iso_string }
    }

    pub fn from_datetime(date: &DateTime<Utc>) -> Self {
        ParseDate {
            iso: format_iso(date),
        }
    }

    pub fn iso(&self) -> &str {
        &self.iso
    }

    /// Parses the ISO string into a UTC `DateTime`.
    pub fn to_datetime(&self) -> Result<DateTime<Utc>, ParseError> {
        parse_iso(&self.iso)
    }
}

/// Formats a date the way Parse Server does, e.g. `2024-05-01T10:00:00.000Z`.
pub fn format_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso(iso: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(iso)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| ParseError::JsonDeserializationFailed(format!("invalid date '{}': {}", iso, e)))
}

impl<'de> Deserialize<'de> for ParseDate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ParseDate { iso: s })
    }
}

impl Serialize for ParseDate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.iso)
    }
}
