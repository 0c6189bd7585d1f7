//! Highlight (segment) models.
//!
//! A highlight is the only piece of the segment-selection output the
//! reframing engine cares about: a start and end offset into the source.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::timestamp::{parse_timestamp, TimestampError};

/// A highlight segment selected from the source video.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Highlight {
    /// Clip title
    #[serde(default)]
    pub title: String,

    /// Start timestamp (HH:MM:SS, HH:MM:SS.mmm or HH:MM:SS,mmm)
    #[serde(alias = "start_time")]
    pub start: String,

    /// End timestamp (HH:MM:SS, HH:MM:SS.mmm or HH:MM:SS,mmm)
    #[serde(alias = "end_time")]
    pub end: String,

    /// Opening hook line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_text: Option<String>,

    /// Reason why this is a good clip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Highlight {
    /// Create a new highlight.
    pub fn new(title: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            start: start.into(),
            end: end.into(),
            hook_text: None,
            reason: None,
        }
    }

    /// Start offset in seconds.
    pub fn start_secs(&self) -> Result<f64, TimestampError> {
        parse_timestamp(&self.start)
    }

    /// End offset in seconds.
    pub fn end_secs(&self) -> Result<f64, TimestampError> {
        parse_timestamp(&self.end)
    }

    /// Validated `(start, duration)` pair in seconds.
    pub fn span(&self) -> Result<(f64, f64), TimestampError> {
        let start = self.start_secs()?;
        let end = self.end_secs()?;
        if start >= end {
            return Err(TimestampError::StartNotBeforeEnd);
        }
        Ok((start, end - start))
    }
}
