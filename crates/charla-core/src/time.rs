// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timestamp helpers shared by the storage and scheduling layers.
//!
//! All persisted timestamps are millisecond-precision UTC strings in the
//! fixed format below. The format sorts lexicographically, so SQL string
//! comparison against a computed cutoff is a valid time comparison.

use chrono::{DateTime, Utc};

use crate::error::CharlaError;

/// Persisted timestamp format: `2026-01-01T00:00:00.000Z`.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in the persisted format.
pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Formats a datetime in the persisted format.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Parses a persisted timestamp back into a datetime.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, CharlaError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CharlaError::Internal(format!("malformed timestamp {s:?}: {e}")))
}
