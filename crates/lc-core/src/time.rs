//! Time utilities for logcast
//!
//! Textual timestamps carried in published records, file-name stamps and the
//! fractional epoch seconds GELF expects.

use chrono::{DateTime, Local, TimeZone};
use std::fmt::Write;

/// Microsecond-precision timestamp format of published records
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Format used in log file names
pub const FILE_STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Render `t` as `YYYY-MM-DD HH:MM:SS.ffffff`.
///
/// # Examples
/// ```
/// use chrono::{Local, TimeZone};
/// use lc_core::time::format_timestamp;
///
/// let t = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
/// assert_eq!(format_timestamp(&t), "2024-05-01 09:30:00.000000");
/// ```
pub fn format_timestamp<Tz: TimeZone>(t: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::with_capacity(26);
    write_timestamp(&mut out, t);
    out
}

/// Append the formatted timestamp to `out`, reusing its allocation.
pub fn write_timestamp<Tz: TimeZone>(out: &mut String, t: &DateTime<Tz>)
where
    Tz::Offset: std::fmt::Display,
{
    // Writing into a String cannot fail
    let _ = write!(out, "{}", t.format(TIMESTAMP_FORMAT));
}

/// `YYYYMMDD-HHMMSS` stamp for file names
pub fn file_stamp(t: &DateTime<Local>) -> String {
    t.format(FILE_STAMP_FORMAT).to_string()
}

/// Seconds since the UNIX epoch with microsecond resolution.
pub fn unix_seconds<Tz: TimeZone>(t: &DateTime<Tz>) -> f64 {
    t.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn sample() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_micro_opt(9, 30, 15, 42)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_timestamp_has_microseconds() {
        assert_eq!(format_timestamp(&sample()), "2024-05-01 09:30:15.000042");
    }

    #[test]
    fn test_write_timestamp_appends() {
        let mut out = String::from(">");
        write_timestamp(&mut out, &sample());
        assert_eq!(out, ">2024-05-01 09:30:15.000042");
    }

    #[test]
    fn test_unix_seconds() {
        let secs = unix_seconds(&sample());
        let expected = sample().timestamp() as f64 + 0.000042;
        assert!((secs - expected).abs() < 1e-6);
    }

    #[test]
    fn test_file_stamp() {
        let t = Local.with_ymd_and_hms(2023, 12, 31, 23, 59, 58).unwrap();
        assert_eq!(file_stamp(&t), "20231231-235958");
    }
}
