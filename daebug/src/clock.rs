//! Clock and name-formatting utilities (`spec.md` §4.A).
//!
//! Pure functions only — no I/O, no shared state.

use chrono::{Local, TimeZone};
use std::time::{Duration, SystemTime};

/// Lowercase `s`, collapse runs of non-alphanumeric characters to a single
/// `-`, and strip leading/trailing `-`, yielding a DNS-label-like token.
///
/// Idempotent: `sanitize_name(sanitize_name(s)) == sanitize_name(s)`.
#[must_use]
pub fn sanitize_name(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dash = false;
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Format a wall-clock instant as local `HH:MM:SS`.
#[must_use]
pub fn clock_fmt(ts: SystemTime) -> String {
    let datetime = Local
        .timestamp_opt(
            ts.duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default() as i64,
            0,
        )
        .single()
        .unwrap_or_else(Local::now);
    datetime.format("%H:%M:%S").to_string()
}

/// Format a duration the way reply headers render it: milliseconds under
/// two seconds, otherwise seconds with one decimal place.
#[must_use]
pub fn duration_fmt(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 2000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
