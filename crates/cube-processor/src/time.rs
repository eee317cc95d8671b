//! Time axis helpers.
//!
//! Cube time coordinates are held as `i64` nanoseconds since the Unix epoch.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{CubeError, Result};

/// Units of a time coordinate stored in a Zarr array or NetCDF variable.
pub const NANOSECONDS_SINCE_EPOCH: &str = "nanoseconds since 1970-01-01T00:00:00Z";

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Convert a UTC datetime to epoch nanoseconds.
///
/// Datetimes outside the ~584 year i64 range saturate.
pub fn to_nanos(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().unwrap_or_else(|| {
        if dt.timestamp() < 0 {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

/// Convert epoch nanoseconds back to a UTC datetime.
pub fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}

/// ISO-8601 rendering used in logs.
pub fn format_nanos(nanos: i64) -> String {
    from_nanos(nanos).format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
}

/// Render a span in nanoseconds as a human readable duration.
pub fn format_span(nanos: i64) -> String {
    let total_secs = nanos / NANOS_PER_SECOND;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if days > 0 {
        format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Parse a maximum-duration string.
///
/// Accepts ISO-8601 durations (`P3D`, `PT36H`, `P1DT12H30M`, `P1W`) and
/// `<number><unit>` forms (`3d`, `72h`, `90 min`, `3 days`, `1.5h`).
pub fn parse_duration(s: &str) -> Result<Duration> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CubeError::config("duration must not be empty"));
    }
    let duration = if trimmed.starts_with('P') || trimmed.starts_with('p') {
        parse_iso8601_duration(trimmed)
    } else {
        parse_unit_duration(trimmed)
    }
    .ok_or_else(|| CubeError::config(format!("cannot parse duration '{}'", s)))?;

    if duration < Duration::zero() {
        return Err(CubeError::config(format!("duration '{}' is negative", s)));
    }
    Ok(duration)
}

fn parse_iso8601_duration(s: &str) -> Option<Duration> {
    let body = &s[1..];
    if body.is_empty() {
        return None;
    }
    let (date_part, time_part) = match body.find(['T', 't']) {
        Some(idx) => (&body[..idx], Some(&body[idx + 1..])),
        None => (body, None),
    };

    let mut total_secs = 0.0f64;
    total_secs += sum_designators(date_part, |c| match c {
        'Y' => Some(365.0 * 86_400.0),
        'M' => Some(30.0 * 86_400.0),
        'W' => Some(7.0 * 86_400.0),
        'D' => Some(86_400.0),
        _ => None,
    })?;
    if let Some(time_part) = time_part {
        if time_part.is_empty() {
            return None;
        }
        total_secs += sum_designators(time_part, |c| match c {
            'H' => Some(3600.0),
            'M' => Some(60.0),
            'S' => Some(1.0),
            _ => None,
        })?;
    }
    secs_to_duration(total_secs)
}

/// Sum `<number><designator>` pairs, e.g. `1DT` date part `"1D"`.
fn sum_designators(part: &str, unit: impl Fn(char) -> Option<f64>) -> Option<f64> {
    let mut total = 0.0;
    let mut number = String::new();
    for c in part.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(if c == ',' { '.' } else { c });
        } else {
            let scale = unit(c.to_ascii_uppercase())?;
            let value: f64 = number.parse().ok()?;
            total += value * scale;
            number.clear();
        }
    }
    if number.is_empty() {
        Some(total)
    } else {
        None
    }
}

fn parse_unit_duration(s: &str) -> Option<Duration> {
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(s.len());
    let value: f64 = s[..split].trim().parse().ok()?;
    let unit = s[split..].trim().to_lowercase();
    let scale = match unit.as_str() {
        "w" | "wk" | "week" | "weeks" => 7.0 * 86_400.0,
        "d" | "day" | "days" => 86_400.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        _ => return None,
    };
    secs_to_duration(value * scale)
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    if !secs.is_finite() {
        return None;
    }
    let nanos = secs * NANOS_PER_SECOND as f64;
    if nanos.abs() > i64::MAX as f64 {
        return None;
    }
    Some(Duration::nanoseconds(nanos.round() as i64))
}

/// A parsed CF-style `"<unit> since <epoch>"` time encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeUnits {
    /// Nanoseconds per unit step.
    pub step_nanos: i64,
    /// Reference epoch in nanoseconds.
    pub epoch_nanos: i64,
}

impl TimeUnits {
    /// Parse a units attribute such as `"hours since 2000-01-01 00:00:00"`.
    pub fn parse(units: &str) -> Result<Self> {
        let trimmed = units.trim();
        let idx = trimmed
            .to_ascii_lowercase()
            .find(" since ")
            .ok_or_else(|| CubeError::invalid_metadata(format!("time units '{}' lack 'since'", units)))?;
        let unit = trimmed[..idx].to_ascii_lowercase();
        let epoch = &trimmed[idx + " since ".len()..];

        let step_nanos = match unit.trim() {
            "nanoseconds" | "nanosecond" | "ns" => 1,
            "microseconds" | "microsecond" | "us" => 1_000,
            "milliseconds" | "millisecond" | "ms" => 1_000_000,
            "seconds" | "second" | "secs" | "sec" | "s" => NANOS_PER_SECOND,
            "minutes" | "minute" | "mins" | "min" => 60 * NANOS_PER_SECOND,
            "hours" | "hour" | "hrs" | "hr" | "h" => 3600 * NANOS_PER_SECOND,
            "days" | "day" | "d" => 86_400 * NANOS_PER_SECOND,
            other => {
                return Err(CubeError::invalid_metadata(format!(
                    "unsupported time unit '{}'",
                    other
                )))
            }
        };

        let epoch = parse_epoch(epoch.trim()).ok_or_else(|| {
            CubeError::invalid_metadata(format!("cannot parse time epoch in '{}'", units))
        })?;

        Ok(Self {
            step_nanos,
            epoch_nanos: to_nanos(&epoch),
        })
    }

    /// Decode a raw coordinate value to epoch nanoseconds.
    pub fn decode(&self, value: f64) -> i64 {
        let offset = value * self.step_nanos as f64;
        self.epoch_nanos.saturating_add(offset.round() as i64)
    }
}

fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    let s = s
        .trim_end_matches("UTC")
        .trim_end_matches("utc")
        .trim()
        .trim_end_matches(['Z', 'z']);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&format!("{}Z", s.replace(' ', "T"))) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    // Date only, possibly without zero padding (CF allows "1970-1-1")
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nanos_roundtrip_instant() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        assert_eq!(from_nanos(to_nanos(&dt)), dt);
        assert_eq!(format_nanos(to_nanos(&dt)), "2024-01-01T01:00:00Z");
    }

    #[test]
    fn test_parse_iso8601_durations() {
        assert_eq!(parse_duration("P3D").unwrap(), Duration::days(3));
        assert_eq!(parse_duration("PT36H").unwrap(), Duration::hours(36));
        assert_eq!(
            parse_duration("P1DT12H30M").unwrap(),
            Duration::days(1) + Duration::hours(12) + Duration::minutes(30)
        );
        assert_eq!(parse_duration("P1W").unwrap(), Duration::days(7));
        assert_eq!(parse_duration("PT0S").unwrap(), Duration::zero());
    }

    #[test]
    fn test_parse_unit_durations() {
        assert_eq!(parse_duration("3d").unwrap(), Duration::days(3));
        assert_eq!(parse_duration("72h").unwrap(), Duration::hours(72));
        assert_eq!(parse_duration("90 min").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("3 days").unwrap(), Duration::days(3));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::minutes(90));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("P").is_err());
        assert!(parse_duration("PT").is_err());
        assert!(parse_duration("3 fortnights").is_err());
        assert!(parse_duration("-2d").is_err());
        assert!(parse_duration("P3X").is_err());
    }

    #[test]
    fn test_time_units_hours_since() {
        let units = TimeUnits::parse("hours since 2024-01-01 00:00:00").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap();
        assert_eq!(units.decode(6.0), to_nanos(&expected));
    }

    #[test]
    fn test_time_units_variants() {
        let units = TimeUnits::parse("days since 1970-1-1").unwrap();
        assert_eq!(units.decode(1.0), 86_400 * NANOS_PER_SECOND);

        let units = TimeUnits::parse("seconds since 1970-01-01T00:00:00Z").unwrap();
        assert_eq!(units.decode(30.0), 30 * NANOS_PER_SECOND);

        let units = TimeUnits::parse(NANOSECONDS_SINCE_EPOCH).unwrap();
        assert_eq!(units.decode(5.0), 5);

        assert!(TimeUnits::parse("fortnights since 1970-01-01").is_err());
        assert!(TimeUnits::parse("hours").is_err());
    }

    #[test]
    fn test_format_span() {
        assert_eq!(format_span(3 * 86_400 * NANOS_PER_SECOND), "3d 00:00:00");
        assert_eq!(format_span(5400 * NANOS_PER_SECOND), "01:30:00");
    }
}
