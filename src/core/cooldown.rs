//! Cooldown and elapsed time helpers.
//!
//! Pure functions over timestamps. Callers pass `now` explicitly so the rules
//! can be tested without a clock.

use chrono::{DateTime, TimeDelta, Utc};

/// State of a rate-limited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    /// Whether the action is still blocked
    pub is_active: bool,
    /// When the block ends, `None` if the action never happened
    pub expires_at: Option<DateTime<Utc>>,
}

/// Computes the cooldown of an action last performed at `last`.
#[must_use]
pub fn cooldown(last: Option<DateTime<Utc>>, duration: TimeDelta, now: DateTime<Utc>) -> Cooldown {
    let expires_at = last.map(|at| at + duration);
    Cooldown {
        is_active: expires_at.is_some_and(|end| now < end),
        expires_at,
    }
}

/// Cooldown with a duration configured in minutes.
#[must_use]
pub fn cooldown_minutes(last: Option<DateTime<Utc>>, minutes: i64, now: DateTime<Utc>) -> Cooldown {
    cooldown(last, TimeDelta::minutes(minutes.max(0)), now)
}

/// Formats the time until `expires_at` as `2h 5min`, `5min` or `12s`.
#[must_use]
pub fn format_time_left(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let remaining = (expires_at - now).num_seconds().max(0);
    let hours = remaining / 3600;
    let minutes = (remaining % 3600) / 60;
    let seconds = remaining % 60;

    if hours > 0 {
        format!("{hours}h {minutes}min")
    } else if minutes > 0 {
        format!("{minutes}min")
    } else {
        format!("{seconds}s")
    }
}

/// Fraction of `days` elapsed since `since`, capped at 1.
///
/// Returns 0 when there is no start date or `days` is not positive. Used to
/// grow supporter and booster bonuses over time.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn time_elapsed_factor(since: Option<DateTime<Utc>>, days: i64, now: DateTime<Utc>) -> f64 {
    let Some(since) = since else {
        return 0.0;
    };
    if days <= 0 {
        return 0.0;
    }

    let elapsed = (now - since).num_milliseconds() as f64;
    let window = TimeDelta::days(days).num_milliseconds() as f64;
    (elapsed / window).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_cooldown_never_used() {
        let state = cooldown_minutes(None, 60, at(12, 0, 0));
        assert!(!state.is_active);
        assert!(state.expires_at.is_none());
    }

    #[test]
    fn test_cooldown_active_until_expiry() {
        let state = cooldown_minutes(Some(at(12, 0, 0)), 60, at(12, 59, 59));
        assert!(state.is_active);
        assert_eq!(state.expires_at, Some(at(13, 0, 0)));

        let state = cooldown_minutes(Some(at(12, 0, 0)), 60, at(13, 0, 0));
        assert!(!state.is_active);
    }

    #[test]
    fn test_format_time_left() {
        assert_eq!(format_time_left(at(14, 5, 30), at(12, 0, 0)), "2h 5min");
        assert_eq!(format_time_left(at(12, 7, 10), at(12, 0, 0)), "7min");
        assert_eq!(format_time_left(at(12, 0, 12), at(12, 0, 0)), "12s");
        assert_eq!(format_time_left(at(11, 0, 0), at(12, 0, 0)), "0s");
    }

    #[test]
    fn test_time_elapsed_factor() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let week_later = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();
        let month_later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();

        assert_eq!(time_elapsed_factor(None, 14, week_later), 0.0);
        assert_eq!(time_elapsed_factor(Some(start), 0, week_later), 0.0);
        assert_eq!(time_elapsed_factor(Some(start), 14, week_later), 0.5);
        assert_eq!(time_elapsed_factor(Some(start), 14, month_later), 1.0);
    }
}
