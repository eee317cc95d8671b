//! Filename timestamp extraction.
//!
//! A granule's timestamp lives in its filename. The configured pattern must
//! match from the start of the name, one of its named groups holds the raw
//! timestamp string, and the parsed value may be truncated to a coarser unit
//! so that granules from the same acquisition land in one time group.

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CubeError, Result};

/// Unit to which extracted timestamps are rounded down.
///
/// Ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TruncationUnit {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Microsecond,
}

impl TruncationUnit {
    /// Reset every unit finer than `self`, leaving coarser units unchanged.
    pub fn truncate(self, dt: DateTime<Utc>) -> DateTime<Utc> {
        let month = if self >= Self::Month { dt.month() } else { 1 };
        let day = if self >= Self::Day { dt.day() } else { 1 };
        let hour = if self >= Self::Hour { dt.hour() } else { 0 };
        let minute = if self >= Self::Minute { dt.minute() } else { 0 };
        let second = if self >= Self::Second { dt.second() } else { 0 };
        let nanos = match self {
            // Keep whole microseconds; leap-second nanos (>= 1e9) are preserved as-is
            Self::Microsecond => dt.nanosecond() - dt.nanosecond() % 1_000,
            _ => 0,
        };

        NaiveDate::from_ymd_opt(dt.year(), month, day)
            .and_then(|d| d.and_hms_nano_opt(hour, minute, second, nanos))
            .map(|ndt| Utc.from_utc_datetime(&ndt))
            .unwrap_or(dt)
    }
}

impl std::str::FromStr for TruncationUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "year" => Ok(Self::Year),
            "month" => Ok(Self::Month),
            "day" => Ok(Self::Day),
            "hour" => Ok(Self::Hour),
            "minute" => Ok(Self::Minute),
            "second" => Ok(Self::Second),
            "microsecond" => Ok(Self::Microsecond),
            other => Err(format!("unknown truncation unit '{}'", other)),
        }
    }
}

impl std::fmt::Display for TruncationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Microsecond => "microsecond",
        };
        f.write_str(name)
    }
}

/// Derives granule timestamps from filenames.
#[derive(Debug, Clone)]
pub struct TimestampExtractor {
    pattern: Regex,
    source: String,
    group: String,
    format: String,
    truncate: Option<TruncationUnit>,
}

impl TimestampExtractor {
    /// Compile an extractor.
    ///
    /// Fails with `ConfigValidation` if the pattern does not compile or does
    /// not define `group`.
    pub fn new(
        pattern: &str,
        group: impl Into<String>,
        format: impl Into<String>,
        truncate: Option<TruncationUnit>,
    ) -> Result<Self> {
        let group = group.into();
        let anchored = Regex::new(&format!("^(?:{})", pattern))
            .map_err(|e| CubeError::config(format!("invalid filename pattern: {}", e)))?;
        if !anchored.capture_names().flatten().any(|name| name == group) {
            return Err(CubeError::config(format!(
                "filename pattern does not define group '{}'",
                group
            )));
        }
        Ok(Self {
            pattern: anchored,
            source: pattern.to_string(),
            group,
            format: format.into(),
            truncate,
        })
    }

    /// The pattern as configured, without the added start anchor.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Extract the timestamp from the final component of `path`.
    pub fn extract(&self, path: &Path) -> Result<DateTime<Utc>> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        self.extract_from_name(&filename)
    }

    /// Extract the timestamp from a bare filename.
    pub fn extract_from_name(&self, filename: &str) -> Result<DateTime<Utc>> {
        let captures = self
            .pattern
            .captures(filename)
            .ok_or_else(|| CubeError::PatternMismatch {
                filename: filename.to_string(),
                pattern: self.source.clone(),
            })?;

        let raw = captures
            .name(&self.group)
            .map(|m| m.as_str())
            .ok_or_else(|| CubeError::TimestampParse {
                filename: filename.to_string(),
                reason: format!("group '{}' did not participate in the match", self.group),
            })?;

        let parsed = parse_timestamp(raw, &self.format).map_err(|reason| {
            CubeError::TimestampParse {
                filename: filename.to_string(),
                reason,
            }
        })?;

        Ok(match self.truncate {
            Some(unit) => unit.truncate(parsed),
            None => parsed,
        })
    }
}

/// Parse `raw` with a strftime format, accepting date-only formats and
/// formats carrying an offset.
fn parse_timestamp(raw: &str, format: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ndt) = NaiveDateTime::parse_from_str(raw, format) {
        return Ok(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, format) {
        return Ok(dt.with_timezone(&Utc));
    }
    match NaiveDate::parse_from_str(raw, format) {
        Ok(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|ndt| Utc.from_utc_datetime(&ndt))
            .ok_or_else(|| format!("'{}' is out of range", raw)),
        Err(e) => Err(format!("'{}' does not match format '{}': {}", raw, format, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opera() -> TimestampExtractor {
        TimestampExtractor::new(
            r"OPERA_L3_DSWx-HLS_T\w+_(?P<ts>\d{8}T\d{6}Z)_",
            "ts",
            "%Y%m%dT%H%M%SZ",
            Some(TruncationUnit::Day),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_truncated_to_day() {
        let ts = opera()
            .extract(Path::new(
                "/data/OPERA_L3_DSWx-HLS_T15SXR_20240105T164321Z_20240107T000000Z_S2A_30_v1.0_B01_WTR.tif",
            ))
            .unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_no_truncation_keeps_everything() {
        let extractor =
            TimestampExtractor::new(r"A_(?P<ts>\d{8}T\d{6}Z)\.nc", "ts", "%Y%m%dT%H%M%SZ", None)
                .unwrap();
        let ts = extractor.extract_from_name("A_20240101T013045Z.nc").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 1, 30, 45).unwrap());
    }

    #[test]
    fn test_truncation_units() {
        let dt = Utc
            .with_ymd_and_hms(2024, 7, 19, 13, 45, 30)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();

        assert_eq!(
            TruncationUnit::Year.truncate(dt),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            TruncationUnit::Month.truncate(dt),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            TruncationUnit::Hour.truncate(dt),
            Utc.with_ymd_and_hms(2024, 7, 19, 13, 0, 0).unwrap()
        );
        assert_eq!(
            TruncationUnit::Second.truncate(dt),
            Utc.with_ymd_and_hms(2024, 7, 19, 13, 45, 30).unwrap()
        );
        assert_eq!(TruncationUnit::Microsecond.truncate(dt).nanosecond(), 123_456_000);
    }

    #[test]
    fn test_pattern_must_match_from_start() {
        let extractor =
            TimestampExtractor::new(r"A_(?P<ts>\d{8})", "ts", "%Y%m%d", None).unwrap();
        assert!(extractor.extract_from_name("A_20240101.nc").is_ok());

        let err = extractor.extract_from_name("foo.tif").unwrap_err();
        match err {
            CubeError::PatternMismatch { filename, pattern } => {
                assert_eq!(filename, "foo.tif");
                assert_eq!(pattern, r"A_(?P<ts>\d{8})");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            extractor.extract_from_name("xA_20240101.nc"),
            Err(CubeError::PatternMismatch { .. })
        ));
    }

    #[test]
    fn test_date_only_format_is_midnight() {
        let extractor =
            TimestampExtractor::new(r"A_(?P<ts>\d{8})", "ts", "%Y%m%d", None).unwrap();
        let ts = extractor.extract_from_name("A_20240101.nc").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_unparseable_timestamp() {
        let extractor =
            TimestampExtractor::new(r"A_(?P<ts>\d{8})", "ts", "%Y%m%d", None).unwrap();
        assert!(matches!(
            extractor.extract_from_name("A_20241399.nc"),
            Err(CubeError::TimestampParse { .. })
        ));
    }

    #[test]
    fn test_optional_group_missing() {
        let extractor =
            TimestampExtractor::new(r"A_(?:(?P<ts>\d{8})|x)", "ts", "%Y%m%d", None).unwrap();
        assert!(matches!(
            extractor.extract_from_name("A_x.nc"),
            Err(CubeError::TimestampParse { .. })
        ));
    }

    #[test]
    fn test_construction_errors() {
        assert!(matches!(
            TimestampExtractor::new(r"A_(?P<ts>\d{8}", "ts", "%Y%m%d", None),
            Err(CubeError::ConfigValidation { .. })
        ));
        assert!(matches!(
            TimestampExtractor::new(r"A_(?P<date>\d{8})", "ts", "%Y%m%d", None),
            Err(CubeError::ConfigValidation { .. })
        ));
    }

    #[test]
    fn test_truncation_unit_parse_and_order() {
        assert_eq!("Day".parse::<TruncationUnit>(), Ok(TruncationUnit::Day));
        assert!("fortnight".parse::<TruncationUnit>().is_err());
        assert!(TruncationUnit::Year < TruncationUnit::Microsecond);
    }
}
