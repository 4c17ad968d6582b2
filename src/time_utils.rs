// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Convert an LMS epoch-seconds timestamp to RFC3339.
///
/// The LMS uses `0` for "not set".
pub fn lms_timestamp(seconds: i64) -> Option<String> {
    if seconds <= 0 {
        return None;
    }
    DateTime::from_timestamp(seconds, 0).map(format_utc_rfc3339)
}
