use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// Offset-bearing layouts tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Layouts without an offset; the value is taken as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d-%b-%Y %H:%M:%S",
];

/// A timestamp recognised in a log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTimestamp {
    /// Instant used for ordering
    pub instant: DateTime<Utc>,
    /// ISO-8601 rendering; carries an offset only if the input did
    pub iso: String,
}

/// Parse the timestamp forms found in capture and external logs.
///
/// Accepts RFC 3339, ISO-8601 with a space separator (with or without an
/// offset), PHP/WordPress `01-Jan-2024 10:00:00 UTC` and bare dates.
/// Values without an offset are interpreted as UTC.
pub fn parse_timestamp(input: &str) -> Option<ParsedTimestamp> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(with_offset(dt));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(input, format) {
            return Some(with_offset(dt));
        }
    }

    // Trailing zone names are only recognised for UTC
    if let Some(stripped) = input
        .strip_suffix(" UTC")
        .or_else(|| input.strip_suffix(" GMT"))
    {
        return parse_naive(stripped.trim_end())
            .map(|naive| with_offset(naive.and_utc().fixed_offset()));
    }

    if let Some(naive) = parse_naive(input) {
        return Some(ParsedTimestamp {
            instant: naive.and_utc(),
            iso: naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
        });
    }

    None
}

fn parse_naive(input: &str) -> Option<NaiveDateTime> {
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn with_offset(dt: DateTime<FixedOffset>) -> ParsedTimestamp {
    ParsedTimestamp {
        instant: dt.with_timezone(&Utc),
        iso: dt.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_rfc3339() {
        let parsed = parse_timestamp("2024-01-01T10:05:00.000Z").unwrap();
        assert_eq!(parsed.instant, utc(2024, 1, 1, 10, 5, 0));

        let parsed = parse_timestamp("2024-01-01T12:00:00+02:00").unwrap();
        assert_eq!(parsed.instant, utc(2024, 1, 1, 10, 0, 0));
        assert_eq!(parsed.iso, "2024-01-01T12:00:00+02:00");
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let parsed = parse_timestamp("2024-01-01 10:00:00").unwrap();
        assert_eq!(parsed.instant, utc(2024, 1, 1, 10, 0, 0));
        assert_eq!(parsed.iso, "2024-01-01T10:00:00");

        let parsed = parse_timestamp("2024-01-01T10:00:00.250").unwrap();
        assert_eq!(parsed.iso, "2024-01-01T10:00:00.250");
    }

    #[test]
    fn test_parse_wordpress_format() {
        let parsed = parse_timestamp("01-Jan-2024 10:00:00 UTC").unwrap();
        assert_eq!(parsed.instant, utc(2024, 1, 1, 10, 0, 0));
    }

    #[test]
    fn test_parse_date_only() {
        let parsed = parse_timestamp("2024-03-15").unwrap();
        assert_eq!(parsed.instant, utc(2024, 3, 15, 0, 0, 0));
    }

    #[test]
    fn test_parse_rejects_text() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("ERROR").is_none());
        assert!(parse_timestamp("notice").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
    }
}
