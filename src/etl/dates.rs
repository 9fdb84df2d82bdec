//! Timestamp, date-of-birth and column-name normalization

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const TIMESTAMP_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Date-of-birth formats, tried in order; the first match wins.
const DOB_FORMATS: [&str; 3] = ["%d/%m/%Y", "%m/%d/%Y", "%B %d, %Y"];

/// Parse a transaction timestamp. Offsets in RFC 3339 input are folded into UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.naive_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Epoch milliseconds, as written by columnar dataframe exports.
pub fn timestamp_from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis).map(|ts| ts.naive_utc())
}

/// Parse a date of birth; `None` means unknown.
pub fn parse_dob(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DOB_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Lower-case a column name and replace spaces with underscores.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_timestamp_formats() {
        let plain = parse_timestamp("2019-01-01 00:00:18").unwrap();
        assert_eq!(plain.hour(), 0);
        assert_eq!(plain.second(), 18);

        let iso = parse_timestamp("2019-01-01T13:05:00").unwrap();
        assert_eq!(iso.hour(), 13);

        let fractional = parse_timestamp("2019-01-01 13:05:00.250").unwrap();
        assert_eq!(fractional.minute(), 5);

        let offset = parse_timestamp("2019-01-01T13:05:00+02:00").unwrap();
        assert_eq!(offset.hour(), 11);

        let date_only = parse_timestamp("2019-03-04").unwrap();
        assert_eq!((date_only.day(), date_only.hour()), (4, 0));

        assert!(parse_timestamp("yesterday at noon").is_none());
    }

    #[test]
    fn test_timestamp_from_millis() {
        let ts = timestamp_from_millis(1_546_300_818_000).unwrap();
        assert_eq!(ts.to_string(), "2019-01-01 00:00:18");
    }

    #[test]
    fn test_dob_first_matching_format_wins() {
        // Day-first is tried before month-first.
        let ambiguous = parse_dob("03/04/1988").unwrap();
        assert_eq!((ambiguous.day(), ambiguous.month()), (3, 4));

        // Only valid month-first.
        let month_first = parse_dob("12/31/1975").unwrap();
        assert_eq!((month_first.month(), month_first.day()), (12, 31));

        let long_form = parse_dob("March 9, 1988").unwrap();
        assert_eq!((long_form.year(), long_form.month(), long_form.day()), (1988, 3, 9));

        assert!(parse_dob("1988-03-09").is_none());
        assert!(parse_dob("").is_none());
    }

    #[test]
    fn test_normalize_column() {
        assert_eq!(normalize_column("Trans Date Trans Time"), "trans_date_trans_time");
        assert_eq!(normalize_column(" CC_NUM "), "cc_num");
    }
}
