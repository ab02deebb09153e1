// SPDX-FileCopyrightText: 2026 Charla Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable interval parsing for follow-up sequences ("15m", "2h",
//! "1d", "1w").

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn interval_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*(\d+)\s*([a-z]+)\s*$").unwrap())
}

/// Converts an interval string into minutes.
///
/// Accepts a leading integer and a unit token (m/min/minutes, h/hr/hours,
/// d/day/days, w/week/weeks), case-insensitive, optional spacing.
/// Unrecognized or missing units yield 0: callers must treat 0 as
/// "do not schedule", never as "schedule immediately".
pub fn parse_interval_to_minutes(interval: &str) -> i64 {
    let Some(caps) = interval_re().captures(interval) else {
        return 0;
    };
    let Ok(amount) = caps[1].parse::<i64>() else {
        return 0;
    };
    let unit = caps[2].to_ascii_lowercase();
    let per_unit = match unit.as_str() {
        "m" | "min" | "mins" | "minute" | "minutes" => 1,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60,
        "d" | "day" | "days" => 60 * 24,
        "w" | "week" | "weeks" => 60 * 24 * 7,
        _ => return 0,
    };
    amount.saturating_mul(per_unit)
}

/// The instant `interval` after `from`, or `None` for unparseable intervals.
pub fn calculate_scheduled_time(interval: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let minutes = parse_interval_to_minutes(interval);
    if minutes == 0 {
        return None;
    }
    Some(from + Duration::minutes(minutes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_all_unit_spellings() {
        assert_eq!(parse_interval_to_minutes("15m"), 15);
        assert_eq!(parse_interval_to_minutes("15 min"), 15);
        assert_eq!(parse_interval_to_minutes("15 Minutes"), 15);
        assert_eq!(parse_interval_to_minutes("2h"), 120);
        assert_eq!(parse_interval_to_minutes("2 HR"), 120);
        assert_eq!(parse_interval_to_minutes("3 hours"), 180);
        assert_eq!(parse_interval_to_minutes("1d"), 1440);
        assert_eq!(parse_interval_to_minutes("2 days"), 2880);
        assert_eq!(parse_interval_to_minutes("1w"), 10080);
        assert_eq!(parse_interval_to_minutes("2 weeks"), 20160);
    }

    #[test]
    fn unknown_or_missing_units_yield_zero() {
        assert_eq!(parse_interval_to_minutes("15"), 0);
        assert_eq!(parse_interval_to_minutes("15x"), 0);
        assert_eq!(parse_interval_to_minutes("fortnight"), 0);
        assert_eq!(parse_interval_to_minutes(""), 0);
        assert_eq!(parse_interval_to_minutes("m15"), 0);
        assert_eq!(parse_interval_to_minutes("-2h"), 0);
    }

    #[test]
    fn scheduled_time_rolls_over_midnight() {
        let t = Utc.with_ymd_and_hms(2026, 3, 14, 23, 30, 0).unwrap();
        let scheduled = calculate_scheduled_time("1h", t).unwrap();
        assert_eq!(scheduled, Utc.with_ymd_and_hms(2026, 3, 15, 0, 30, 0).unwrap());
    }

    #[test]
    fn scheduled_time_rolls_over_month() {
        let t = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        let scheduled = calculate_scheduled_time("1d", t).unwrap();
        assert_eq!(scheduled, Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn scheduled_time_is_none_for_unparseable() {
        let t = Utc::now();
        assert!(calculate_scheduled_time("soon", t).is_none());
    }
}
