use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};

/// Format used when displaying or serializing a datetime value.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Date formats accepted by the default culture, most specific first.
pub const DEFAULT_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d",
    "%m/%d/%Y",
];

/// Parses a datetime using RFC 3339 first, then each of the given formats in order.
///
/// Formats without a time component are tried as dates and resolve to midnight. Values with an
/// offset are normalized to UTC.
pub fn parse_datetime<S: AsRef<str>>(text: &str, formats: &[S]) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    formats.iter().find_map(|format| {
        let format = format.as_ref();
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
    })
}

/// Renders a datetime with seven fractional digits, `yyyy-MM-ddTHH:mm:ss.fffffff`.
pub fn format_round_trip(value: &NaiveDateTime) -> String {
    format!(
        "{}.{:07}",
        value.format("%Y-%m-%dT%H:%M:%S"),
        value.nanosecond() % 1_000_000_000 / 100
    )
}
