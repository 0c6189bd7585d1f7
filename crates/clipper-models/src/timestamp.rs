//! Timestamp parsing and formatting utilities.
//!
//! Highlight offsets arrive either as plain clock values (`HH:MM:SS`,
//! `HH:MM:SS.mmm`, `MM:SS`, `SS`) or in the SRT subtitle form
//! `HH:MM:SS,mmm` that the transcript stage emits.

use thiserror::Error;

/// Maximum reasonable video duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing/validation error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, HH:MM:SS,mmm, MM:SS, or SS")]
    InvalidFormat(String),

    #[error("Start time must be before end time")]
    StartNotBeforeEnd,

    #[error("Timestamp exceeds maximum allowed duration ({} hours)", .0 / 3600.0)]
    ExceedsMaxDuration(f64),
}

/// Parse a timestamp string to total seconds.
///
/// Supports formats:
/// - `HH:MM:SS`, `HH:MM:SS.mmm` or `HH:MM:SS,mmm` (SRT)
/// - `MM:SS` or `MM:SS.mmm`
/// - `SS` or `SS.mmm`
///
/// # Examples
/// ```
/// use clipper_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("00:00:05,250").unwrap(), 5.25);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    // SRT uses a comma as the millisecond separator.
    let normalized = ts.replace(',', ".");
    let parts: Vec<&str> = normalized.split(':').collect();

    let total = match parts.as_slice() {
        [secs] => parse_component("seconds", secs)?,
        [mins, secs] => parse_component("minutes", mins)? * 60.0 + parse_component("seconds", secs)?,
        [hours, mins, secs] => {
            parse_component("hours", hours)? * 3600.0
                + parse_component("minutes", mins)? * 60.0
                + parse_component("seconds", secs)?
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if total > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_VIDEO_DURATION_SECS));
    }

    Ok(total)
}

fn parse_component(name: &'static str, value: &str) -> Result<f64, TimestampError> {
    let parsed: f64 = value
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, value.to_string()))?;
    if !parsed.is_finite() {
        return Err(TimestampError::InvalidValue(name, value.to_string()));
    }
    if parsed < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(parsed)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}
