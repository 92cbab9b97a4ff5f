//! Correctness oracle for a TCP traffic generator: runs it as a child
//! process and checks the framing and bandwidth visible in its output.

mod analyze;
mod error;
mod histogram;
mod parse;
mod process;
mod segmentation;

pub use analyze::{AnalysisResult, Analyzer};
pub use error::{Error, Metric, Result};
pub use histogram::{LengthHistogram, OVERFLOW_BUCKET, bucket_length};
pub use parse::{Direction, EventKind, IoEvent, LineParser, ParsedEvent, SocketBuffer, TagStyle};
pub use process::{
    CapturedOutput, DEFAULT_CAPTURE_FLAG, DEFAULT_LAUNCH_GRACE, LaunchOptions, ProcessHandle,
};
pub use segmentation::{SegmentationOutcome, SegmentationReport, check_segmentation};
