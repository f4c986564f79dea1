//! The `DATE` property format, `m-dd-yyyy, h:mm` in UTC.

use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, Utc};

const FORMAT: &str = "%-m-%d-%Y, %-H:%M";

pub fn format(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(FORMAT).to_string()
}

/// Parses a `DATE` value into Unix seconds. Any of `-`, `,`, `:` and
/// space separate the fields.
pub fn parse(date: &str) -> Option<i64> {
    let mut fields = date
        .split(['-', ',', ':', ' '])
        .filter(|field| !field.is_empty())
        .map(|field| field.parse::<u32>().ok());
    let month = fields.next()??;
    let day = fields.next()??;
    let year = fields.next()??;
    let hour = fields.next()??;
    let minute = fields.next()??;

    let time = NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_opt(hour, minute, 0)?;
    Some(time.and_utc().timestamp())
}

pub fn unix_seconds(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// True if a source modified at `mtime` is no newer than a `DATE` stamp,
/// compared at minute resolution.
pub fn is_up_to_date(mtime: i64, date: i64) -> bool {
    mtime.div_euclid(60) <= date.div_euclid(60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        assert_eq!(format(time), "9-09-2001, 1:46");
    }

    #[test]
    fn test_parse_round_trip() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        assert_eq!(parse(&format(time)), Some(1_000_000_000 - 40));
        assert_eq!(parse("12-31-1999, 23:59"), Some(946_684_740));
        assert_eq!(parse("garbage"), None);
        assert_eq!(parse("13-01-2000, 0:00"), None);
    }

    #[test]
    fn test_minute_resolution() {
        let date = parse("1-01-2020, 10:00").unwrap();
        assert!(is_up_to_date(date + 59, date));
        assert!(!is_up_to_date(date + 60, date));
        assert!(is_up_to_date(date - 3600, date));
    }
}
