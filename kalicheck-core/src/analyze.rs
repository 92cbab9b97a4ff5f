//! Derives write/read length histograms and summary figures from the
//! captured output of one generator run.

use crate::error::{Error, Metric, Result};
use crate::histogram::LengthHistogram;
use crate::parse::{Direction, LineParser, ParsedEvent, TagStyle};
use crate::process::CapturedOutput;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AnalysisResult {
    pub out_lengths: LengthHistogram,
    pub out_num: u64,
    pub out_min_length: Option<u64>,
    pub out_max_length: Option<u64>,
    pub in_lengths: LengthHistogram,
    pub in_num: u64,
    pub in_min_length: Option<u64>,
    pub in_max_length: Option<u64>,
    pub bw_down_mbps: f64,
    pub bw_up_mbps: f64,
    pub total_sent_bytes: u64,
    pub total_received_bytes: u64,
    /// False once the generator warned that a socket buffer option was ignored.
    pub sockopt_works: bool,
}

impl AnalysisResult {
    pub fn from_output(output: &CapturedOutput, style: TagStyle) -> Result<Self> {
        Analyzer::new(style)?.analyze(&output.stdout, &output.stderr)
    }

    pub fn output_length_percentile_lte(&self, n: u64) -> u8 {
        self.out_lengths.percentile_at_most(n)
    }

    pub fn input_length_percentile_lte(&self, n: u64) -> u8 {
        self.in_lengths.percentile_at_most(n)
    }

    /// Named figures in a stable order, for diagnostics.
    pub fn metrics(&self) -> Vec<(&'static str, String)> {
        vec![
            ("bw_down_mbps", self.bw_down_mbps.to_string()),
            ("bw_up_mbps", self.bw_up_mbps.to_string()),
            ("in_lengths", self.in_lengths.to_string()),
            ("in_max_length", opt_to_string(self.in_max_length)),
            ("in_min_length", opt_to_string(self.in_min_length)),
            ("in_num", self.in_num.to_string()),
            ("out_lengths", self.out_lengths.to_string()),
            ("out_max_length", opt_to_string(self.out_max_length)),
            ("out_min_length", opt_to_string(self.out_min_length)),
            ("out_num", self.out_num.to_string()),
            ("sockopt_works", self.sockopt_works.to_string()),
            ("total_received_bytes", self.total_received_bytes.to_string()),
            ("total_sent_bytes", self.total_sent_bytes.to_string()),
        ]
    }

    pub fn debug_dump(&self) {
        for (metric, value) in self.metrics() {
            debug!(metric, %value, "analysis");
        }
    }
}

fn opt_to_string(v: Option<u64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[derive(Debug, Default)]
struct LengthStats {
    lengths: LengthHistogram,
    num: u64,
    min: Option<u64>,
    max: Option<u64>,
}

impl LengthStats {
    fn record(&mut self, length: u64) {
        self.lengths.record(length);
        self.num += 1;
        self.min = Some(self.min.map_or(length, |m| m.min(length)));
        self.max = Some(self.max.map_or(length, |m| m.max(length)));
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    parser: LineParser,
}

impl Analyzer {
    pub fn new(style: TagStyle) -> Result<Self> {
        Ok(Self::with_parser(LineParser::new(style)?))
    }

    pub fn with_parser(parser: LineParser) -> Self {
        Self { parser }
    }

    pub fn parser(&self) -> &LineParser {
        &self.parser
    }

    /// Builds an [`AnalysisResult`] from one run's output.
    ///
    /// Per-event records and buffer warnings are read from `stderr`; the
    /// bandwidth and byte total lines must each appear exactly once on
    /// `stdout`.
    pub fn analyze<S: AsRef<str>>(&self, stdout: &[S], stderr: &[S]) -> Result<AnalysisResult> {
        let mut out = LengthStats::default();
        let mut inp = LengthStats::default();
        let mut sockopt_works = true;

        for ev in self.parser.events(stderr.iter().map(|line| line.as_ref())) {
            match ev {
                ParsedEvent::Write(io) => out.record(io.length),
                ParsedEvent::Read(io) => inp.record(io.length),
                ParsedEvent::CapabilityWarning { .. } => sockopt_works = false,
                _ => {}
            }
        }

        let mut bandwidth = None;
        let mut sent = None;
        let mut received = None;

        for ev in self.parser.events(stdout.iter().map(|line| line.as_ref())) {
            match ev {
                ParsedEvent::Bandwidth { down_mbps, up_mbps } => {
                    store_once(&mut bandwidth, (down_mbps, up_mbps), Metric::AggregateBandwidth)?;
                }
                ParsedEvent::ByteTotal {
                    direction: Direction::Sent,
                    bytes,
                } => store_once(&mut sent, bytes, Metric::TotalSent)?,
                ParsedEvent::ByteTotal {
                    direction: Direction::Received,
                    bytes,
                } => store_once(&mut received, bytes, Metric::TotalReceived)?,
                _ => {}
            }
        }

        let (bw_down_mbps, bw_up_mbps) =
            bandwidth.ok_or(Error::MissingMetric(Metric::AggregateBandwidth))?;

        let result = AnalysisResult {
            out_lengths: out.lengths,
            out_num: out.num,
            out_min_length: out.min,
            out_max_length: out.max,
            in_lengths: inp.lengths,
            in_num: inp.num,
            in_min_length: inp.min,
            in_max_length: inp.max,
            bw_down_mbps,
            bw_up_mbps,
            total_sent_bytes: sent.ok_or(Error::MissingMetric(Metric::TotalSent))?,
            total_received_bytes: received.ok_or(Error::MissingMetric(Metric::TotalReceived))?,
            sockopt_works,
        };
        result.debug_dump();
        Ok(result)
    }
}

fn store_once<T>(slot: &mut Option<T>, value: T, metric: Metric) -> Result<()> {
    if slot.replace(value).is_some() {
        return Err(Error::DuplicateMetric(metric));
    }
    Ok(())
}
