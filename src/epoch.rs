//! TLE epoch parsing and UTC timestamp shifting.
//!
//! A TLE line 1 encodes its epoch in columns 19-20 (two-digit year) and
//! 21-32 (fractional day-of-year), both 1-indexed. Column numbering here
//! follows the spec's convention exactly; see `parse_tle_epoch`.

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, TimeZone, Utc};

use crate::errors::ParseError;

const YEAR_START: usize = 18; // column 19, 0-indexed
const YEAR_END: usize = 20; // exclusive
const DOY_START: usize = 20; // column 21, 0-indexed
const DOY_END: usize = 32; // exclusive

/// Parses the epoch embedded in a TLE line 1 into a UTC instant.
///
/// Two-digit years below 57 are treated as 20xx, otherwise 19xx (the
/// standard NORAD convention, chosen so that the range covers satellites
/// launched from the start of the space age through 2056).
pub fn parse_tle_epoch(tle_line1: &str) -> Result<DateTime<Utc>, ParseError> {
    if tle_line1.len() < DOY_END {
        return Err(ParseError::LineTooShort(tle_line1.len()));
    }

    let year_field = &tle_line1[YEAR_START..YEAR_END];
    let yy: u32 = year_field
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidYear(year_field.to_string()))?;
    let year = if yy < 57 { 2000 + yy } else { 1900 + yy };

    let doy_field = &tle_line1[DOY_START..DOY_END];
    let fractional_doy: f64 = doy_field
        .trim()
        .parse()
        .map_err(|_| ParseError::InvalidDayOfYear(doy_field.to_string()))?;

    let jan1 = Utc
        .with_ymd_and_hms(year as i32, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| ParseError::InvalidYear(year_field.to_string()))?;

    let offset_seconds = ((fractional_doy - 1.0) * 86_400.0).round() as i64;
    Ok(jan1 + ChronoDuration::seconds(offset_seconds))
}

/// Shifts a TLE epoch forward by `tsince_min` minutes, as produced by the
/// SGP4 adapter's `tsince_min` field.
pub fn shift_timestamp(epoch: DateTime<Utc>, tsince_min: f64) -> DateTime<Utc> {
    let seconds = (tsince_min * 60.0).round() as i64;
    epoch + ChronoDuration::seconds(seconds)
}

/// ISO-8601 formatting with a literal `Z` suffix, matching the wire format
/// spec.md calls for at the interface boundary (DB writes bind the
/// `DateTime<Utc>` directly and never go through this function; it exists
/// for logging and any textual reporting).
pub fn format_utc(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epoch_at_start_of_year() {
        // yy=24, doy=1.0 -> exactly 2024-01-01T00:00:00Z
        let line1 = "1 25544U 98067A   24001.00000000  .00016717  00000-0  10270-3 0  9000";
        let epoch = parse_tle_epoch(line1).unwrap();
        assert_eq!(epoch, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_fractional_day_within_one_second() {
        // doy=152.00000000 -> 2024-06-01T00:00:00Z for a leap year (day 1 = Jan 1)
        let line1 = "1 25544U 98067A   24152.00000000  .00016717  00000-0  10270-3 0  9001";
        let epoch = parse_tle_epoch(line1).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        assert!((epoch - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn two_digit_year_century_pivot() {
        let low = "1 25544U 98067A   56001.00000000  .00016717  00000-0  10270-3 0  9002";
        let high = "1 25544U 98067A   57001.00000000  .00016717  00000-0  10270-3 0  9003";
        assert_eq!(parse_tle_epoch(low).unwrap().format("%Y").to_string(), "2056");
        assert_eq!(parse_tle_epoch(high).unwrap().format("%Y").to_string(), "1957");
    }

    #[test]
    fn rejects_lines_shorter_than_32_characters() {
        let err = parse_tle_epoch("1 25544U 98067A").unwrap_err();
        assert!(matches!(err, ParseError::LineTooShort(_)));
    }

    #[test]
    fn shift_timestamp_rounds_to_nearest_second() {
        let epoch = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let shifted = shift_timestamp(epoch, 2.0);
        assert_eq!(shifted, Utc.with_ymd_and_hms(2024, 6, 1, 0, 2, 0).unwrap());
    }

    #[test]
    fn format_utc_has_trailing_z() {
        let epoch = Utc.with_ymd_and_hms(2024, 6, 1, 0, 2, 0).unwrap();
        assert_eq!(format_utc(epoch), "2024-06-01T00:02:00Z");
    }
}
