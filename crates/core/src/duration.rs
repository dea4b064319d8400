//! Human-readable duration strings (`15m`, `2h`, `1h30m`, `1d`).
//!
//! Grammar: optional unit groups in fixed order `y w d h m s ms`, each a
//! decimal integer followed by its unit. `1y` is 365 days and `1w` is 7 days.
//! The literal `"0"` is accepted as zero.

use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("not a valid duration string: {0:?}")]
    Invalid(String),
    #[error("duration out of range: {0:?}")]
    Overflow(String),
}

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$")
        .expect("duration regex compiles")
});

const UNIT_MILLIS: [u64; 7] = [
    365 * 24 * 60 * 60 * 1000, // y
    7 * 24 * 60 * 60 * 1000,   // w
    24 * 60 * 60 * 1000,       // d
    60 * 60 * 1000,            // h
    60 * 1000,                 // m
    1000,                      // s
    1,                         // ms
];

/// Parse a duration string into a `std::time::Duration`.
pub fn parse_duration(s: &str) -> Result<Duration, DurationParseError> {
    match s {
        "" => return Err(DurationParseError::Empty),
        "0" => return Ok(Duration::ZERO),
        _ => {}
    }
    let caps = DURATION_RE
        .captures(s)
        .ok_or_else(|| DurationParseError::Invalid(s.to_string()))?;

    let mut total: u64 = 0;
    for (i, unit) in UNIT_MILLIS.iter().enumerate() {
        let Some(m) = caps.get(i + 1) else { continue };
        let n: u64 = m
            .as_str()
            .parse()
            .map_err(|_| DurationParseError::Overflow(s.to_string()))?;
        total = n
            .checked_mul(*unit)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| DurationParseError::Overflow(s.to_string()))?;
    }
    // Must fit in i64 nanoseconds.
    if total > (i64::MAX as u64) / 1_000_000 {
        return Err(DurationParseError::Overflow(s.to_string()));
    }
    Ok(Duration::from_millis(total))
}

/// `created + ttl`, or `None` when the sum is not representable.
pub fn expiry(created: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(ttl).ok()?;
    created.checked_add_signed(delta)
}
