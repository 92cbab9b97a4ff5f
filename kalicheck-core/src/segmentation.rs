//! Checks that the dumped payloads of one direction reassemble into whole
//! repetitions of the message template.
//!
//! Unlike the histogram checks this is not statistical: any stray byte means
//! the generator split, truncated or interleaved a message.

use crate::parse::{EventKind, LineParser};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentationOutcome {
    /// The stream is exactly `repetitions` copies of the template.
    Consistent { repetitions: usize },
    /// No payload of the requested kind was captured.
    Empty,
    /// The stream does not even start with the template.
    NotFound { preview: String },
    /// Whole repetitions end at `offset` and something else follows.
    Broken { offset: usize, preview: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationReport {
    pub kind: EventKind,
    pub template: String,
    pub stream_len: usize,
    pub outcome: SegmentationOutcome,
}

impl SegmentationReport {
    pub fn is_consistent(&self) -> bool {
        matches!(self.outcome, SegmentationOutcome::Consistent { .. })
    }

    /// Byte offset where the stream stopped being whole repetitions.
    pub fn break_offset(&self) -> Option<usize> {
        match self.outcome {
            SegmentationOutcome::Consistent { .. } | SegmentationOutcome::Empty => None,
            SegmentationOutcome::NotFound { .. } => Some(0),
            SegmentationOutcome::Broken { offset, .. } => Some(offset),
        }
    }
}

impl fmt::Display for SegmentationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            SegmentationOutcome::Consistent { repetitions } => write!(
                f,
                "{} stream of {} bytes is {repetitions} repetitions of {:?}",
                self.kind, self.stream_len, self.template
            ),
            SegmentationOutcome::Empty => write!(f, "no {} payloads captured", self.kind),
            SegmentationOutcome::NotFound { preview } => write!(
                f,
                "expected repetition of {:?} is not found in {preview:?}...",
                self.template
            ),
            SegmentationOutcome::Broken { offset, preview } => write!(
                f,
                "output is not consistent after byte {offset} (...{:?}); continuing with {preview:?}...",
                self.template
            ),
        }
    }
}

/// Concatenates the payloads of every `kind` record in `lines`, in capture
/// order, and checks the result against `template`.
pub fn check_segmentation<S: AsRef<str>>(
    parser: &LineParser,
    kind: EventKind,
    lines: &[S],
    template: &str,
) -> SegmentationReport {
    let stream: String = parser
        .events(lines.iter().map(|line| line.as_ref()))
        .filter_map(|ev| ev.io(kind).map(|io| io.payload))
        .collect();

    let outcome = match_repetitions(&stream, template);
    let report = SegmentationReport {
        kind,
        template: template.to_string(),
        stream_len: stream.len(),
        outcome,
    };
    if !report.is_consistent() {
        warn!(%kind, offset = ?report.break_offset(), "{report}");
    }
    report
}

fn match_repetitions(stream: &str, template: &str) -> SegmentationOutcome {
    if stream.is_empty() {
        return SegmentationOutcome::Empty;
    }
    let preview_chars = template.chars().count() + 1;
    if template.is_empty() {
        return SegmentationOutcome::NotFound {
            preview: preview(stream, preview_chars),
        };
    }

    let mut offset = 0;
    while stream[offset..].starts_with(template) {
        offset += template.len();
    }

    if offset == 0 {
        SegmentationOutcome::NotFound {
            preview: preview(stream, preview_chars),
        }
    } else if offset == stream.len() {
        SegmentationOutcome::Consistent {
            repetitions: offset / template.len(),
        }
    } else {
        SegmentationOutcome::Broken {
            offset,
            preview: preview(&stream[offset..], preview_chars),
        }
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
