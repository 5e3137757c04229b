//! Delay calculator: turns a requested date + wall-clock time into a dispatch delay.
//!
//! Pure functions: "now" is always passed in, never read from a clock here.
//! Target instants in the past clamp to a zero delay (dispatch as soon as possible).

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

use medinotify_core::{NotifyError, Result};

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").expect("valid date regex"));
static TIME_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}(:\d{2})?$").expect("valid time regex"));

/// Why a date/time pair could not be turned into an instant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleParseError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid date '{0}' (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("invalid time '{0}' (expected HH:MM or HH:MM:SS)")]
    InvalidTime(String),
    #[error("{0} does not exist in the configured time zone")]
    NonexistentInstant(String),
}

/// Shape check done at validation time: `YYYY-MM-DD` and `HH:MM[:SS]`.
/// A well-shaped but impossible value (2025-02-30, 25:00) passes here and is
/// rejected later by [`resolve_instant`].
pub fn check_shape(date: Option<&str>, time: Option<&str>) -> Result<()> {
    let date = date.map(str::trim).filter(|d| !d.is_empty());
    let time = time.map(str::trim).filter(|t| !t.is_empty());
    match (date, time) {
        (None, _) => Err(NotifyError::Validation("date is required for a future notification".into())),
        (_, None) => Err(NotifyError::Validation("time is required for a future notification".into())),
        (Some(d), _) if !DATE_SHAPE.is_match(d) => {
            Err(NotifyError::Validation(format!("date '{d}' must be YYYY-MM-DD")))
        }
        (_, Some(t)) if !TIME_SHAPE.is_match(t) => {
            Err(NotifyError::Validation(format!("time '{t}' must be HH:MM or HH:MM:SS")))
        }
        _ => Ok(()),
    }
}

pub fn parse_date(raw: &str) -> std::result::Result<NaiveDate, ScheduleParseError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ScheduleParseError::InvalidDate(raw.to_string()))
}

/// `HH:MM` or `HH:MM:SS`; missing seconds default to `:00`.
pub fn parse_time(raw: &str) -> std::result::Result<NaiveTime, ScheduleParseError> {
    let trimmed = raw.trim();
    let full = if trimmed.matches(':').count() == 1 {
        format!("{trimmed}:00")
    } else {
        trimmed.to_string()
    };
    NaiveTime::parse_from_str(&full, "%H:%M:%S")
        .map_err(|_| ScheduleParseError::InvalidTime(raw.to_string()))
}

/// Combine a date and a wall-clock time into an instant in `tz`.
pub fn resolve_instant<Tz: TimeZone>(
    date: &str,
    time: &str,
    tz: &Tz,
) -> std::result::Result<DateTime<Tz>, ScheduleParseError> {
    let naive = NaiveDateTime::new(parse_date(date)?, parse_time(time)?);
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| ScheduleParseError::NonexistentInstant(naive.to_string()))
}

/// Non-negative wait from `now` until `target`.
pub fn delay_until<Tz: TimeZone>(target: &DateTime<Tz>, now: &DateTime<Tz>) -> Duration {
    target
        .clone()
        .signed_duration_since(now.clone())
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Dispatch delay for a notification.
///
/// Immediate notifications always get zero. Future ones combine `date` and
/// `time` in `now`'s time zone; a target already in the past clamps to zero.
pub fn compute_delay<Tz: TimeZone>(
    is_future: bool,
    date: Option<&str>,
    time: Option<&str>,
    now: &DateTime<Tz>,
) -> std::result::Result<Duration, ScheduleParseError> {
    if !is_future {
        return Ok(Duration::ZERO);
    }
    let date = date.ok_or(ScheduleParseError::Missing("date"))?;
    let time = time.ok_or(ScheduleParseError::Missing("time"))?;
    let target = resolve_instant(date, time, &now.timezone())?;
    Ok(delay_until(&target, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_immediate_is_zero_whatever_the_inputs() {
        let now = Utc::now();
        assert_eq!(compute_delay(false, None, None, &now).unwrap(), Duration::ZERO);
        assert_eq!(
            compute_delay(false, Some("2099-01-01"), Some("10:00"), &now).unwrap(),
            Duration::ZERO
        );
        assert_eq!(
            compute_delay(false, Some("garbage"), Some("??"), &now).unwrap(),
            Duration::ZERO
        );
    }

    #[test]
    fn test_one_day_ahead() {
        let now = utc("2025-05-31T09:30:00Z");
        let delay = compute_delay(true, Some("2025-06-01"), Some("09:30"), &now).unwrap();
        assert_eq!(delay.as_millis(), 86_400_000);
    }

    #[test]
    fn test_seconds_are_honoured() {
        let now = utc("2025-05-31T09:30:00Z");
        let delay = compute_delay(true, Some("2025-05-31"), Some("09:30:45"), &now).unwrap();
        assert_eq!(delay, Duration::from_secs(45));
    }

    #[test]
    fn test_past_target_clamps_to_zero() {
        let now = utc("2025-05-31T09:30:00Z");
        for (date, time) in [("2025-05-31", "09:29"), ("2020-01-01", "00:00"), ("2025-05-30", "23:59:59")] {
            let delay = compute_delay(true, Some(date), Some(time), &now).unwrap();
            assert_eq!(delay, Duration::ZERO, "{date} {time}");
        }
    }

    #[test]
    fn test_never_negative_across_a_range_of_targets() {
        let now = utc("2025-05-31T12:00:00Z");
        for day in 25..=31 {
            for hour in [0, 6, 11, 12, 13, 23] {
                let date = format!("2025-05-{day:02}");
                let time = format!("{hour:02}:00");
                let delay = compute_delay(true, Some(&date), Some(&time), &now).unwrap();
                let expected_positive = day == 31 && hour > 12;
                assert_eq!(delay > Duration::ZERO, expected_positive, "{date} {time}");
            }
        }
    }

    #[test]
    fn test_offset_is_applied() {
        let ist = FixedOffset::east_opt(330 * 60).unwrap();
        let now = utc("2025-05-31T04:00:00Z").with_timezone(&ist); // 09:30 local
        let delay = compute_delay(true, Some("2025-05-31"), Some("10:30"), &now).unwrap();
        assert_eq!(delay, Duration::from_secs(3600));
    }

    #[test]
    fn test_impossible_calendar_date() {
        let now = Utc::now();
        assert_eq!(
            compute_delay(true, Some("2025-02-30"), Some("09:00"), &now),
            Err(ScheduleParseError::InvalidDate("2025-02-30".into()))
        );
        assert_eq!(
            compute_delay(true, Some("2025-02-10"), Some("25:00"), &now),
            Err(ScheduleParseError::InvalidTime("25:00".into()))
        );
        assert_eq!(
            compute_delay(true, None, Some("09:00"), &now),
            Err(ScheduleParseError::Missing("date"))
        );
    }

    #[test]
    fn test_shape_check() {
        assert!(check_shape(Some("2025-06-01"), Some("09:30")).is_ok());
        assert!(check_shape(Some("2025-06-01"), Some("09:30:15")).is_ok());
        // Well-shaped but impossible: left for the scheduling step.
        assert!(check_shape(Some("2025-02-30"), Some("25:00")).is_ok());

        for (date, time) in [
            (None, Some("09:30")),
            (Some("2025-06-01"), None),
            (Some(""), Some("09:30")),
            (Some("01/06/2025"), Some("09:30")),
            (Some("2025-06-01"), Some("9.30am")),
        ] {
            let err = check_shape(date, time).unwrap_err();
            assert!(err.is_client_error(), "{date:?} {time:?}");
        }
    }
}
