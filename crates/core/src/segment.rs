// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subtitle segments and millisecond timestamps.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error produced when a timestamp fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid timestamp {0:?}: expected HH:MM:SS,mmm")]
pub struct TimeParseError(pub String);

/// Millisecond-resolution subtitle timestamp.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SubtitleTime(u64);

impl SubtitleTime {
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Parse the SRT timing form `HH:MM:SS,mmm`.
    ///
    /// Hours may exceed two digits; minutes and seconds must be two digits
    /// below 60, milliseconds exactly three digits.
    pub fn parse(s: &str) -> Result<Self, TimeParseError> {
        let err = || TimeParseError(s.to_string());

        let (clock, millis) = s.split_once(',').ok_or_else(err)?;
        let mut parts = clock.split(':');
        let (hours, minutes, seconds) = match (parts.next(), parts.next(), parts.next(), parts.next())
        {
            (Some(h), Some(m), Some(sec), None) => (h, m, sec),
            _ => return Err(err()),
        };

        if hours.is_empty()
            || minutes.len() != 2
            || seconds.len() != 2
            || millis.len() != 3
            || ![hours, minutes, seconds, millis]
                .iter()
                .all(|p| p.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(err());
        }

        let h: u64 = hours.parse().map_err(|_| err())?;
        let m: u64 = minutes.parse().map_err(|_| err())?;
        let sec: u64 = seconds.parse().map_err(|_| err())?;
        let ms: u64 = millis.parse().map_err(|_| err())?;

        if m >= 60 || sec >= 60 {
            return Err(err());
        }

        Ok(Self(((h * 60 + m) * 60 + sec) * 1000 + ms))
    }
}

impl fmt::Display for SubtitleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0 % 1000;
        let total_secs = self.0 / 1000;
        let s = total_secs % 60;
        let m = (total_secs / 60) % 60;
        let h = total_secs / 3600;
        write!(f, "{h:02}:{m:02}:{s:02},{ms:03}")
    }
}

/// One timestamped subtitle block.
///
/// Index is 1-based and contiguous within an artifact. Translation replaces
/// only `text`; timestamps are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub index: u32,
    pub start: SubtitleTime,
    pub end: SubtitleTime,
    pub text: String,
}

impl SubtitleSegment {
    pub fn new(index: u32, start: SubtitleTime, end: SubtitleTime, text: impl Into<String>) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    /// A copy of this segment with the text replaced and timing untouched.
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            index: self.index,
            start: self.start,
            end: self.end,
            text: text.into(),
        }
    }
}

#[cfg(test)]
#[path = "segment_tests.rs"]
mod tests;
