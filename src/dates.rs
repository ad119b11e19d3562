//! Date normalization.
//!
//! Feeds and article metadata carry dates in whatever shape the publisher
//! likes. Two shapes are recognized anywhere inside the input:
//!
//! - RFC 2822 style: `Sat, 25 Jan 2020 01:52:22 +0000`
//! - ISO 8601 style: `2020-01-31T22:10:38+08:00` (colon optional, `Z`
//!   accepted, fractional seconds ignored)
//!
//! The RFC pattern is tried first. Recognized dates are converted to UTC and
//! rendered as `YYYY-MM-DD HH:MM:SS`. Anything else comes back as
//! [`NormalizedDate::Unrecognized`] carrying the input untouched.

use chrono::{DateTime, FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Canonical rendering of every timestamp stored in a record.
pub const CANONICAL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static RFC_2822: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{1,2}) ([ADFJMNOS][a-z]*) (\d{4}) \b((?:[01]\d|2[0-3]):[0-5]\d:[0-5]\d) ([+-]\d{4})\b",
    )
    .expect("valid rfc 2822 regex")
});

static ISO_8601: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}:\d{2})(?:\.\d+)?(?:([+-]\d{2}):?(\d{2})|(Z))")
        .expect("valid iso 8601 regex")
});

/// Outcome of [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedDate {
    /// `YYYY-MM-DD HH:MM:SS` in UTC.
    Canonical(String),
    /// Input that matched neither pattern, returned as-is.
    Unrecognized(String),
}

impl NormalizedDate {
    pub fn is_canonical(&self) -> bool {
        matches!(self, NormalizedDate::Canonical(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            NormalizedDate::Canonical(s) | NormalizedDate::Unrecognized(s) => s,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            NormalizedDate::Canonical(s) | NormalizedDate::Unrecognized(s) => s,
        }
    }
}

impl fmt::Display for NormalizedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize raw date text to the canonical UTC form.
pub fn normalize(raw: &str) -> NormalizedDate {
    match parse_known(raw) {
        Some(dt) => NormalizedDate::Canonical(format_canonical(&dt.with_timezone(&Utc))),
        None => {
            tracing::debug!(input = %raw, "Date did not match a known pattern");
            NormalizedDate::Unrecognized(raw.to_string())
        }
    }
}

/// Render a UTC timestamp in the canonical form.
pub fn format_canonical(dt: &DateTime<Utc>) -> String {
    dt.format(CANONICAL_FORMAT).to_string()
}

/// Current time in the canonical form.
pub fn now_canonical() -> String {
    format_canonical(&Utc::now())
}

fn parse_known(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Some(caps) = RFC_2822.captures(raw) {
        // chrono wants the three-letter month
        let month: String = caps[2].chars().take(3).collect();
        let text = format!("{} {} {} {} {}", &caps[1], month, &caps[3], &caps[4], &caps[5]);
        if let Ok(dt) = DateTime::parse_from_str(&text, "%d %b %Y %H:%M:%S %z") {
            return Some(dt);
        }
    }

    if let Some(caps) = ISO_8601.captures(raw) {
        let offset = match (caps.get(3), caps.get(4)) {
            (Some(hours), Some(minutes)) => format!("{}{}", hours.as_str(), minutes.as_str()),
            _ => "+0000".to_string(),
        };
        let text = format!("{}T{}{}", &caps[1], &caps[2], offset);
        return DateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%z").ok();
    }

    None
}
