//! Date handling for the engine's ISO variant.
//!
//! The engine writes `2024-01-31T12:00:00.000+0100`: millisecond precision
//! and a numeric offset *without* a colon.
//!
//! # 学習ポイント
//! - chrono の `%z` は colon なし、`%:z` は colon あり
//! - offset のない値は local time とみなす (子プロセスと同じ解釈)

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};

use super::CodecError;

/// Wire format of Date variables.
pub const ENGINE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO 8601 timestamp. Naive values are taken as local time.
///
/// Accepts a `T` or space separator, optional seconds and fraction, an
/// optional offset, or a bare date (midnight).
pub fn parse_iso(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.fixed_offset())
}

/// Parse an engine Date value, tolerating a colon-less `±HHMM` offset.
pub fn from_engine(s: &str) -> Result<DateTime<FixedOffset>, CodecError> {
    parse_iso(&insert_offset_colon(s)).ok_or_else(|| CodecError::InvalidDate {
        value: s.to_string(),
    })
}

/// Render a timestamp the way the engine expects it.
pub fn to_engine(dt: &DateTime<FixedOffset>) -> String {
    dt.format(ENGINE_DATE_FORMAT).to_string()
}

fn insert_offset_colon(s: &str) -> String {
    let b = s.as_bytes();
    let n = b.len();
    if n >= 5 && matches!(b[n - 5], b'+' | b'-') && b[n - 3] != b':' && s.is_char_boundary(n - 2) {
        format!("{}:{}", &s[..n - 2], &s[n - 2..])
    } else {
        s.to_string()
    }
}
