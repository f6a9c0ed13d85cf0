//! Rounding and local-date helpers used across the engine.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Rounds to two decimal places, half-up.
///
/// Used for reward multipliers, which are built from 0.05/0.10 increments, so
/// the binary-float error stays far below the rounding boundary.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Rounds a non-negative value half-up to the nearest whole number.
///
/// XP awards use this: `10 * 1.05` rounds to 11, not 10.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Parses a stored timezone string into a fixed UTC offset.
///
/// Accepted forms: `"UTC"` (or empty), `"+HH:MM"`, `"-HH:MM"`. Anything else
/// yields `None` and callers fall back to UTC rather than failing the request.
pub fn parse_offset(timezone: &str) -> Option<FixedOffset> {
    let tz = timezone.trim();
    if tz.is_empty() || tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return FixedOffset::east_opt(0);
    }

    let sign = match tz.chars().next()? {
        '+' => 1i32,
        '-' => -1i32,
        _ => return None,
    };
    let (hours, minutes) = tz[1..].split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Computes the calendar date in the user's timezone at the given instant.
///
/// Day-boundary logic (streaks, daily targets, insight buckets) is
/// calendar-based, so the same UTC instant can land on different local dates
/// for different users. Unparseable timezones fall back to UTC.
pub fn local_date_in(timezone: &str, now: DateTime<Utc>) -> NaiveDate {
    match parse_offset(timezone) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => {
            tracing::debug!(timezone, "Unparseable timezone, falling back to UTC");
            now.date_naive()
        }
    }
}
