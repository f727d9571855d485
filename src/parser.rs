//! Line parsing for the meter's two wire formats.
//!
//! Timestamped CSV: `2025-11-30 12:34:56.123456,12.345,1.234,15.234`
//! Bare triplet:    `12.345 1.234 15.234` (timestamp implied = now)
//!
//! Parsing never fails loudly: a malformed line yields `None` and the
//! acquisition loop moves on.

use chrono::{DateTime, Datelike, Local, LocalResult, NaiveDateTime, TimeZone};

use crate::types::Sample;

/// Device timestamps older than this year mean the RTC was never set.
const MIN_VALID_YEAR: i32 = 2020;

/// Accepted device timestamp formats, tried in order.
const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse one line in either supported format.
pub fn parse_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.contains(',') {
        parse_csv_line(line)
    } else {
        parse_space_separated(line)
    }
}

/// Parse a device-reported timestamp, substituting the local wall clock when
/// the RTC is clearly unset (pre-2020 date) or the string is unparseable.
/// Keeps garbage low timestamps from corrupting relative-time math downstream.
pub fn parse_timestamp(text: &str) -> DateTime<Local> {
    let text = text.trim();
    for format in TIMESTAMP_FORMATS {
        let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) else {
            continue;
        };
        if parsed.year() < MIN_VALID_YEAR {
            return Local::now();
        }
        return match Local.from_local_datetime(&parsed) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt,
            LocalResult::None => Local::now(),
        };
    }
    Local::now()
}

/// `timestamp,voltage,current,power`
fn parse_csv_line(line: &str) -> Option<Sample> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return None;
    }
    Some(Sample {
        timestamp: parse_timestamp(parts[0]),
        voltage: parts[1].parse().ok()?,
        current: parts[2].parse().ok()?,
        power: parts[3].parse().ok()?,
    })
}

/// `voltage current power`, stamped with the local wall clock.
fn parse_space_separated(line: &str) -> Option<Sample> {
    let mut fields = line.split_whitespace();
    let voltage = fields.next()?.parse().ok()?;
    let current = fields.next()?.parse().ok()?;
    let power = fields.next()?.parse().ok()?;
    Some(Sample {
        timestamp: Local::now(),
        voltage,
        current,
        power,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_line_with_fractional_seconds() {
        let sample = parse_line("2025-11-30 12:34:56.123456,12.345,1.234,15.234").unwrap();
        assert_eq!(sample.voltage, 12.345);
        assert_eq!(sample.current, 1.234);
        assert_eq!(sample.power, 15.234);
        assert_eq!(sample.timestamp.year(), 2025);
        assert_eq!(sample.timestamp.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn csv_line_without_fraction() {
        let sample = parse_line("2025-01-02 03:04:05,5.0,0.5,2.5").unwrap();
        assert_eq!(sample.timestamp.year(), 2025);
        assert_eq!(sample.power, 2.5);
    }

    #[test]
    fn space_separated_defaults_to_now() {
        let before = Local::now();
        let sample = parse_line("12.345 1.234 15.234").unwrap();
        assert_eq!(sample.voltage, 12.345);
        assert!(sample.timestamp >= before);
        assert!((sample.timestamp - before).num_seconds() < 5);
    }

    #[test]
    fn unset_rtc_is_replaced_with_wall_clock() {
        let sample = parse_line("2019-01-01 00:00:00,1,2,3").unwrap();
        assert!(sample.timestamp.year() >= MIN_VALID_YEAR);
        assert!((Local::now() - sample.timestamp).num_seconds().abs() < 5);
        assert_eq!(sample.voltage, 1.0);
    }

    #[test]
    fn garbage_timestamp_is_replaced_with_wall_clock() {
        let sample = parse_line("not-a-date,1.0,2.0,3.0").unwrap();
        assert!((Local::now() - sample.timestamp).num_seconds().abs() < 5);
    }

    #[test]
    fn malformed_lines_yield_none() {
        assert!(parse_line("").is_none());
        assert!(parse_line("bad,data").is_none());
        assert!(parse_line("1.0 2.0").is_none());
        assert!(parse_line("2025-01-01 00:00:00,1.0,oops,3.0").is_none());
        assert!(parse_line("a b c").is_none());
    }

    #[test]
    fn extra_whitespace_is_tolerated() {
        let sample = parse_line("  2025-06-01 10:00:00 , 3.3 , 0.1 , 0.33 ").unwrap();
        assert_eq!(sample.voltage, 3.3);
    }
}
