// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SRT codec: line-numbered blocks of `index`, `start --> end`, text lines,
//! separated by a blank line.
//!
//! Parsing is strict: a malformed artifact fails the whole parse rather than
//! producing a partial segment list. Serialization emits blocks separated by
//! one blank line and ends the file with a single trailing newline.

use crate::segment::{SubtitleSegment, SubtitleTime};
use thiserror::Error;

/// Separator between the start and end timestamps of a block.
const TIMING_ARROW: &str = " --> ";

/// Errors from parsing an SRT artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrtParseError {
    #[error("empty subtitle artifact")]
    Empty,
    #[error("malformed block index at line {line}: {content:?}")]
    BadIndex { line: usize, content: String },
    #[error("malformed timing at line {line}: {content:?}")]
    BadTiming { line: usize, content: String },
    #[error("block at line {line} has no text")]
    MissingText { line: usize },
}

/// Parse an SRT document into ordered segments.
pub fn parse(input: &str) -> Result<Vec<SubtitleSegment>, SrtParseError> {
    // Normalize BOM and line endings up front; blocks are split on blank lines.
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let lines: Vec<&str> = input.lines().map(|l| l.trim_end_matches('\r')).collect();

    let mut segments = Vec::new();
    let mut cursor = 0;

    while cursor < lines.len() {
        // Skip blank lines between blocks.
        if lines[cursor].trim().is_empty() {
            cursor += 1;
            continue;
        }

        let index_line = cursor;
        let index: u32 = lines[cursor]
            .trim()
            .parse()
            .map_err(|_| SrtParseError::BadIndex {
                line: index_line + 1,
                content: lines[cursor].to_string(),
            })?;
        cursor += 1;

        let timing = lines.get(cursor).ok_or(SrtParseError::BadTiming {
            line: cursor + 1,
            content: String::new(),
        })?;
        let (start, end) = parse_timing(timing).ok_or_else(|| SrtParseError::BadTiming {
            line: cursor + 1,
            content: timing.to_string(),
        })?;
        cursor += 1;

        let mut text_lines = Vec::new();
        while cursor < lines.len() && !lines[cursor].trim().is_empty() {
            text_lines.push(lines[cursor]);
            cursor += 1;
        }
        if text_lines.is_empty() {
            return Err(SrtParseError::MissingText {
                line: index_line + 1,
            });
        }

        segments.push(SubtitleSegment::new(index, start, end, text_lines.join("\n")));
    }

    if segments.is_empty() {
        return Err(SrtParseError::Empty);
    }
    Ok(segments)
}

fn parse_timing(line: &str) -> Option<(SubtitleTime, SubtitleTime)> {
    let (start, end) = line.trim().split_once(TIMING_ARROW)?;
    let start = SubtitleTime::parse(start.trim()).ok()?;
    let end = SubtitleTime::parse(end.trim()).ok()?;
    Some((start, end))
}

/// Serialize segments back to SRT.
///
/// Blocks are joined by one blank line; the output ends with exactly one
/// trailing newline.
pub fn serialize(segments: &[SubtitleSegment]) -> String {
    let blocks: Vec<String> = segments
        .iter()
        .map(|seg| format!("{}\n{}{}{}\n{}", seg.index, seg.start, TIMING_ARROW, seg.end, seg.text))
        .collect();
    let mut out = blocks.join("\n\n");
    out.push('\n');
    out
}

/// Renumber indices contiguously starting at 1, preserving order and timing.
pub fn renumber(segments: &mut [SubtitleSegment]) {
    for (i, seg) in segments.iter_mut().enumerate() {
        seg.index = (i + 1) as u32;
    }
}

#[cfg(test)]
#[path = "srt_tests.rs"]
mod tests;
