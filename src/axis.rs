//! Axis value kinds and parsing, per §6 "Axis interpretations".
//!
//! The column kind is decided once, from the prefix sample, and never revisited: a compile-time
//! tagged representation rather than a value that could change dtype at runtime.

use std::cmp::Ordering;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// The inferred kind of the axis (first) column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AxisKind {
    Int64,
    Float64,
    /// ISO-8601 UTC instant, e.g. `2024-01-01T00:00:00Z`.
    Instant,
    /// Opaque, lexicographically-ordered string. Not eligible for range-zoom.
    String,
}

/// A single axis value, tagged by `AxisKind`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AxisValue {
    Int64(i64),
    Float64(f64),
    /// Nanoseconds since the Unix epoch (UTC).
    Instant(i64),
    String(String),
}

impl AxisValue {
    /// Projects the axis value onto a comparable/arithmetic `f64` coordinate, used by the
    /// downsampler's triangle-area math. Instant axes use nanosecond resolution.
    #[must_use]
    pub fn coord(&self) -> f64 {
        match self {
            Self::Int64(v) => *v as f64,
            Self::Float64(v) => *v,
            Self::Instant(ns) => *ns as f64,
            Self::String(_) => f64::NAN,
        }
    }

    /// Converts this UTC instant to a local wall-clock label for display. Non-instant axes
    /// fall back to their natural textual representation.
    #[must_use]
    pub fn local_label(&self) -> String {
        match self {
            Self::Instant(ns) => {
                let secs = ns.div_euclid(1_000_000_000);
                let nanos = ns.rem_euclid(1_000_000_000) as u32;
                DateTime::<Utc>::from_timestamp(secs, nanos).map_or_else(
                    || "invalid-instant".to_string(),
                    |utc| {
                        let local: DateTime<Local> = utc.with_timezone(&Local);
                        local.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
                    },
                )
            }
            Self::Int64(v) => v.to_string(),
            Self::Float64(v) => v.to_string(),
            Self::String(s) => s.clone(),
        }
    }
}

impl PartialOrd for AxisValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int64(a), Self::Int64(b)) => a.partial_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.partial_cmp(b),
            (Self::Instant(a), Self::Instant(b)) => a.partial_cmp(b),
            (Self::String(a), Self::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Probes a raw axis field for its kind, in the order fixed by §6: signed integer, float,
/// ISO-8601 UTC instant, then opaque string.
#[must_use]
pub fn probe_axis_kind(sample: &str) -> AxisKind {
    let trimmed = sample.trim();
    if trimmed.parse::<i64>().is_ok() {
        AxisKind::Int64
    } else if trimmed.parse::<f64>().is_ok() {
        AxisKind::Float64
    } else if parse_instant(trimmed).is_some() {
        AxisKind::Instant
    } else {
        AxisKind::String
    }
}

/// Parses an ISO-8601 UTC instant of the exact form `^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$`.
#[must_use]
pub fn parse_instant(sample: &str) -> Option<i64> {
    if !sample.ends_with('Z') || sample.len() < 20 {
        return None;
    }
    let bytes = sample.as_bytes();
    let shape_ok = bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes[10] == b'T'
        && bytes[13] == b':'
        && bytes[16] == b':'
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[5..7].iter().all(u8::is_ascii_digit)
        && bytes[8..10].iter().all(u8::is_ascii_digit)
        && bytes[11..13].iter().all(u8::is_ascii_digit)
        && bytes[14..16].iter().all(u8::is_ascii_digit)
        && bytes[17..19].iter().all(u8::is_ascii_digit);
    if !shape_ok {
        return None;
    }
    let odt = OffsetDateTime::parse(sample, &Rfc3339).ok()?;
    let secs = odt.unix_timestamp();
    let nanos = i64::from(odt.nanosecond());
    secs.checked_mul(1_000_000_000)?.checked_add(nanos)
}

/// Parses a raw field into an `AxisValue` of the given kind. Unparsable values under a
/// numeric/instant kind are not expected in a well-formed prefix, but callers at read-time
/// fall back to treating the row as malformed rather than panicking.
#[must_use]
pub fn parse_axis_value(kind: AxisKind, raw: &str) -> Option<AxisValue> {
    let trimmed = raw.trim();
    match kind {
        AxisKind::Int64 => trimmed.parse::<i64>().ok().map(AxisValue::Int64),
        AxisKind::Float64 => trimmed.parse::<f64>().ok().map(AxisValue::Float64),
        AxisKind::Instant => parse_instant(trimmed).map(AxisValue::Instant),
        AxisKind::String => Some(AxisValue::String(trimmed.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probes_integer_before_float() {
        assert_eq!(probe_axis_kind("42"), AxisKind::Int64);
        assert_eq!(probe_axis_kind("42.5"), AxisKind::Float64);
    }

    #[test]
    fn probes_instant_pattern() {
        assert_eq!(probe_axis_kind("2024-01-01T00:00:00Z"), AxisKind::Instant);
        assert_eq!(
            probe_axis_kind("2024-01-01T00:00:00.500Z"),
            AxisKind::Instant
        );
    }

    #[test]
    fn falls_back_to_string() {
        assert_eq!(probe_axis_kind("alpha"), AxisKind::String);
    }

    #[test]
    fn instant_ordering_uses_nanoseconds() {
        let a = parse_instant("2024-01-01T00:00:00Z").unwrap();
        let b = parse_instant("2024-01-01T00:00:00.500Z").unwrap();
        assert!(b > a);
    }
}
