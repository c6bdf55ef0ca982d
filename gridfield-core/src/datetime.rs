//! Date and time helpers for field metadata
//!
//! Timestamps without an explicit offset are interpreted as UTC.

use crate::value::MetadataValue;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601-like string into a UTC instant
///
/// Accepts RFC 3339 timestamps, naive `YYYY-MM-DDTHH:MM[:SS]` timestamps,
/// plain `YYYY-MM-DD` dates and compact `YYYYMMDD` dates.
pub fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return from_date_and_time(s.parse().ok()?, 0);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Combine a GRIB-style date (`YYYYMMDD`) and time (`HHMM`) pair
///
/// ```rust
/// use gridfield_core::datetime::from_date_and_time;
///
/// let dt = from_date_and_time(20180801, 1200).unwrap();
/// assert_eq!(dt.to_rfc3339(), "2018-08-01T12:00:00+00:00");
/// ```
pub fn from_date_and_time(date: i64, time: i64) -> Option<DateTime<Utc>> {
    let year = i32::try_from(date / 10000).ok()?;
    let month = u32::try_from((date / 100) % 100).ok()?;
    let day = u32::try_from(date % 100).ok()?;
    let hour = u32::try_from(time / 100).ok()?;
    let minute = u32::try_from(time % 100).ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

/// Interpret a metadata value as an instant
pub fn to_datetime(value: &MetadataValue) -> Option<DateTime<Utc>> {
    match value {
        MetadataValue::DateTime(dt) => Some(*dt),
        MetadataValue::Str(s) => parse_datetime(s),
        // Compact integer dates such as 20200101
        MetadataValue::Int(v) if (10_000_000..100_000_000).contains(v) => from_date_and_time(*v, 0),
        _ => None,
    }
}

/// Forecast step in hours
///
/// Integer and float steps are hours. Strings may carry an `h` suffix or a
/// `start-end` range, in which case the end of the range is used.
pub fn step_hours(value: &MetadataValue) -> Option<f64> {
    match value {
        MetadataValue::Int(_) | MetadataValue::Float(_) => value.as_f64(),
        MetadataValue::Str(s) => {
            let end = s.rsplit('-').next()?.trim();
            end.trim_end_matches('h').parse::<f64>().ok()
        }
        _ => None,
    }
}

pub fn add_hours(base: DateTime<Utc>, hours: f64) -> Option<DateTime<Utc>> {
    let seconds = (hours * 3600.0).round();
    if !seconds.is_finite() {
        return None;
    }
    base.checked_add_signed(Duration::try_seconds(seconds as i64)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn parses_common_forms() {
        let expected = utc(2020, 12, 21, 12);
        assert_eq!(parse_datetime("2020-12-21T12:00:00"), Some(expected));
        assert_eq!(parse_datetime("2020-12-21T12:00:00Z"), Some(expected));
        assert_eq!(parse_datetime("2020-12-21T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_datetime("2020-12-21 12:00"), Some(expected));
        assert_eq!(parse_datetime("2020-12-21"), Some(utc(2020, 12, 21, 0)));
        assert_eq!(parse_datetime("20201221"), Some(utc(2020, 12, 21, 0)));
        assert_eq!(parse_datetime("not a date"), None);
    }

    #[test]
    fn grib_date_time_pairs() {
        assert_eq!(from_date_and_time(20180801, 1200), Some(utc(2018, 8, 1, 12)));
        assert_eq!(from_date_and_time(20180801, 0), Some(utc(2018, 8, 1, 0)));
        assert_eq!(from_date_and_time(20181301, 0), None);
    }

    #[test]
    fn steps() {
        assert_eq!(step_hours(&MetadataValue::Int(6)), Some(6.0));
        assert_eq!(step_hours(&MetadataValue::from("12h")), Some(12.0));
        assert_eq!(step_hours(&MetadataValue::from("0-24")), Some(24.0));
        assert_eq!(step_hours(&MetadataValue::from("abc")), None);
        assert_eq!(add_hours(utc(2020, 1, 1, 0), 30.0), Some(utc(2020, 1, 2, 6)));
    }
}
