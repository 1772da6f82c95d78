// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC calendar day (`YYYY-MM-DD`) used to key daily counters.
pub fn utc_date_key(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Timestamp shapes found in documents shared with other writers.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTimestamp {
    Millis(i64),
    FractionalMillis(f64),
    /// RFC 3339, as Firestore timestamp values decode
    Text(String),
    /// `{seconds, nanos}` as exported by the Admin SDKs
    Parts {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanos: i64,
    },
}

/// Deserialize an optional timestamp into epoch milliseconds.
///
/// Accepts integer milliseconds, an RFC 3339 string, or a seconds/nanos
/// map. `null` and a missing field are `None`.
pub fn deserialize_optional_epoch_ms<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = Option::<StoredTimestamp>::deserialize(deserializer)?;
    stored
        .map(|ts| match ts {
            StoredTimestamp::Millis(ms) => Ok(ms),
            StoredTimestamp::FractionalMillis(ms) => Ok(ms as i64),
            StoredTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {text:?}: {e}"))),
            StoredTimestamp::Parts { seconds, nanos } => {
                Ok(seconds.saturating_mul(1000) + nanos / 1_000_000)
            }
        })
        .transpose()
}
