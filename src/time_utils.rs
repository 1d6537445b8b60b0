// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! Stored timestamps use a fixed-width RFC3339 form (`2024-01-15T10:00:00.000Z`)
//! so that string order in Firestore matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format a UTC timestamp as fixed-width RFC3339 with millisecond precision.
pub fn format_utc_millis(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp into UTC.
pub fn parse_utc(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields stored as fixed-width strings.
pub mod utc_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_utc_millis(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_utc(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_millis_format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(500);

        assert_eq!(format_utc_millis(whole), "2024-01-15T10:00:00.000Z");
        assert_eq!(format_utc_millis(fractional), "2024-01-15T10:00:00.500Z");
        assert!(format_utc_millis(whole) < format_utc_millis(fractional));
    }

    #[test]
    fn test_parse_normalizes_offset() {
        let parsed = parse_utc("2024-01-15T12:00:00+02:00").unwrap();
        assert_eq!(format_utc_rfc3339(parsed), "2024-01-15T10:00:00Z");
    }
}
