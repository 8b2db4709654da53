//! ISO date/time parsing and strftime rendering.

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt::Write;

use super::errors::{FormatError, FormatResult};
use super::models::CellValue;

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parses `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parses `HH:MM` or `HH:MM:SS[.fff]`.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Parses `YYYY-MM-DD[ T]HH:MM[:SS[.fff]]`, with an optional trailing `Z`.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    let s = s.strip_suffix('Z').unwrap_or(s);
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Date part of a cell value.
pub fn date_of(value: &CellValue) -> Result<NaiveDate, String> {
    match value {
        CellValue::Date(d) => Ok(*d),
        CellValue::DateTime(dt) => Ok(dt.date()),
        CellValue::Text(s) => parse_date(s)
            .or_else(|| parse_datetime(s).map(|dt| dt.date()))
            .ok_or_else(|| format!("not a date: \"{}\"", s)),
        other => Err(format!("expected a date, found {}", other.kind())),
    }
}

/// Time part of a cell value.
pub fn time_of(value: &CellValue) -> Result<NaiveTime, String> {
    match value {
        CellValue::Time(t) => Ok(*t),
        CellValue::DateTime(dt) => Ok(dt.time()),
        CellValue::Text(s) => parse_time(s)
            .or_else(|| parse_datetime(s).map(|dt| dt.time()))
            .ok_or_else(|| format!("not a time: \"{}\"", s)),
        other => Err(format!("expected a time, found {}", other.kind())),
    }
}

/// Date and time of a cell value; bare dates read as midnight.
pub fn datetime_of(value: &CellValue) -> Result<NaiveDateTime, String> {
    match value {
        CellValue::DateTime(dt) => Ok(*dt),
        CellValue::Date(d) => Ok(d.and_time(NaiveTime::MIN)),
        CellValue::Text(s) => parse_datetime(s)
            .or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
            .ok_or_else(|| format!("not a datetime: \"{}\"", s)),
        other => Err(format!("expected a datetime, found {}", other.kind())),
    }
}

/// Rejects strftime patterns chrono cannot render.
pub fn validate_pattern(pattern: &str) -> FormatResult<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(FormatError::FormatConfig(format!(
            "Invalid date/time pattern: {}",
            pattern
        )));
    }
    Ok(())
}

/// `write!`-based rendering so a bad pattern surfaces as an error, not a panic.
pub fn try_render(display: impl std::fmt::Display) -> Result<String, String> {
    let mut out = String::new();
    write!(out, "{}", display).map_err(|_| "unrenderable date/time pattern".to_string())?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_iso_forms() {
        assert_eq!(parse_date("2024-03-15"), NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(parse_date("2024-13-01"), None);
        assert_eq!(parse_time("14:05"), NaiveTime::from_hms_opt(14, 5, 0));
        assert_eq!(parse_time("14:05:09"), NaiveTime::from_hms_opt(14, 5, 9));
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(8, 30, 0))
            .unwrap();
        assert_eq!(parse_datetime("2024-03-15T08:30:00"), Some(expected));
        assert_eq!(parse_datetime("2024-03-15 08:30"), Some(expected));
        assert_eq!(parse_datetime("2024-03-15T08:30:00Z"), Some(expected));
    }

    #[test]
    fn test_value_extraction() {
        let dt = CellValue::Text("2020-01-02 03:04:05".to_string());
        assert_eq!(date_of(&dt), Ok(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()));
        assert_eq!(time_of(&dt), Ok(NaiveTime::from_hms_opt(3, 4, 5).unwrap()));

        let date = CellValue::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap());
        assert_eq!(datetime_of(&date).unwrap().time(), NaiveTime::MIN);

        assert!(date_of(&CellValue::Text("yesterday".to_string())).is_err());
        assert!(time_of(&CellValue::Number(3.0)).is_err());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("%Y-%m-%d").is_ok());
        assert!(validate_pattern("%A, %B %-d").is_ok());
        assert!(matches!(validate_pattern("%Q"), Err(FormatError::FormatConfig(_))));
    }

    #[test]
    fn test_try_render() {
        let d = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(try_render(d.format("%b %-d, %Y")).unwrap(), "Jul 4, 2024");
    }
}
