use clap::Parser;
use kalicheck_core::TagStyle;
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 100ms, 1s)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!("invalid duration '{s}' (expected e.g. 100ms, 1s)"));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 100ms, 1s)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        _ => Err(format!("invalid duration '{s}' (expected e.g. 100ms, 1s)")),
    }
}

fn parse_tag_style(input: &str) -> Result<TagStyle, String> {
    input
        .parse()
        .map_err(|_| format!("invalid tag style '{input}' (expected snd-rcv or out-in)"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-friendly lines on stderr.
    Pretty,
    /// One JSON object per line on stderr.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "kalicheck",
    version,
    about = "Correctness oracle for the tcpkali traffic generator",
    long_about = "Runs tcpkali against itself on loopback and checks that its write sizes, message boundaries, bandwidth and byte totals match the requested shaping.\n\nEach scenario prints a PASS/FAIL line; the process exits non-zero if any scenario fails.",
    after_help = "Examples:\n  kalicheck --tcpkali ./src/tcpkali\n  kalicheck --only 'Rate limiting' --log-level debug\n  TCPKALI=/usr/local/bin/tcpkali kalicheck --report-json report.json"
)]
pub struct Cli {
    /// Path to the tcpkali binary (a bare name is looked up on PATH)
    #[arg(long, env = "TCPKALI", default_value = "../src/tcpkali")]
    pub(crate) tcpkali: PathBuf,

    /// Ports are allocated sequentially starting right after this one
    #[arg(long, env = "KALICHECK_PORT_BASE", default_value_t = 1350)]
    pub(crate) port_base: u16,

    /// Tokens the generator uses to mark per-write/per-read dumps
    #[arg(long, value_parser = parse_tag_style, default_value = "snd-rcv")]
    pub(crate) tag_style: TagStyle,

    /// Skip scenarios that are too timing-sensitive for shared CI hosts
    #[arg(long, env = "CONTINUOUS_INTEGRATION")]
    pub(crate) ci: bool,

    /// How far above the expected byte count a bandwidth-capped sender may go
    /// (as a multiple of the upper band); the sender converges slowly
    #[arg(long, env = "KALICHECK_SENDER_TOLERANCE", default_value_t = 3.0)]
    pub(crate) sender_tolerance: f64,

    /// How long tcpkali must stay alive after spawn to count as launched
    #[arg(long, value_parser = parse_duration, default_value = "100ms")]
    pub(crate) launch_grace: Duration,

    /// Only run scenarios whose title contains this text (repeatable)
    #[arg(long = "only", value_name = "TEXT")]
    pub(crate) only: Vec<String>,

    /// Print the scenario titles and exit
    #[arg(long)]
    pub(crate) list: bool,

    /// Log filter (overridden by RUST_LOG)
    #[arg(long, env = "KALICHECK_LOG", default_value = "info")]
    pub(crate) log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub(crate) log_format: LogFormat,

    /// Write a machine-readable report of every scenario to this file
    #[arg(long, value_name = "PATH")]
    pub(crate) report_json: Option<PathBuf>,
}
