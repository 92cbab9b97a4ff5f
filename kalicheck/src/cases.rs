//! Scenario catalogue: each case launches one or two tcpkali instances on
//! loopback and asserts on what their output reveals.

use crate::cli::Cli;
use crate::report::Verdict;
use anyhow::{Context, Result};
use kalicheck_core::{
    AnalysisResult, Analyzer, EventKind, LaunchOptions, LengthHistogram, ProcessHandle,
    check_segmentation,
};
use std::path::PathBuf;

const MSG: &str = "ABC";
const MSG_LEN: u64 = MSG.len() as u64;

/// Option sets every bandwidth scenario is repeated with.
const VARIANTS: [&[&str]; 4] = [
    &[],
    &["--websocket"],
    &["--write-combine=off"],
    &["--websocket", "--write-combine=off"],
];

/// Byte-total band around the theoretical transfer of a capped channel.
const BAND_MIN: f64 = 0.85;
const BAND_MAX: f64 = 1.10;

/// Shared state for running scenarios: where tcpkali lives, how its output is
/// parsed and which loopback port comes next.
pub(crate) struct Runner {
    tcpkali: PathBuf,
    analyzer: Analyzer,
    launch: LaunchOptions,
    next_port: u16,
    sender_tolerance: f64,
}

impl Runner {
    pub(crate) fn new(tcpkali: PathBuf, cli: &Cli) -> Result<Self> {
        Ok(Self {
            tcpkali,
            analyzer: Analyzer::new(cli.tag_style).context("compile event grammar")?,
            launch: LaunchOptions {
                grace: cli.launch_grace,
                ..LaunchOptions::default()
            },
            next_port: cli.port_base,
            sender_tolerance: cli.sender_tolerance,
        })
    }

    fn port(&mut self) -> Result<u16> {
        self.next_port = self
            .next_port
            .checked_add(1)
            .with_context(|| format!("ran out of ports after {}", self.next_port))?;
        Ok(self.next_port)
    }

    fn start(&self, args: &[String], capture_io: bool) -> Result<ProcessHandle> {
        ProcessHandle::start_with(&self.tcpkali, args, capture_io, &self.launch)
            .with_context(|| format!("start tcpkali {}", args.join(" ")))
    }

    fn analyze(
        &self,
        handle: &mut ProcessHandle,
        role: &'static str,
        verdict: &mut Verdict,
    ) -> Result<AnalysisResult> {
        let pid = handle.pid();
        let out = handle
            .results()
            .with_context(|| format!("collect {role} output (pid {pid})"))?;
        let result = self
            .analyzer
            .analyze(&out.stdout, &out.stderr)
            .with_context(|| format!("analyze {role} output (pid {pid})"))?;
        verdict.record(role, &result);
        Ok(result)
    }
}

type CaseFn = Box<dyn Fn(&mut Runner, &mut Verdict) -> Result<()>>;

pub(crate) struct Case {
    pub(crate) title: String,
    /// Too timing-sensitive for shared CI hosts.
    pub(crate) skip_in_ci: bool,
    run: CaseFn,
}

impl Case {
    fn new(
        title: impl Into<String>,
        run: impl Fn(&mut Runner, &mut Verdict) -> Result<()> + 'static,
    ) -> Self {
        Self {
            title: title.into(),
            skip_in_ci: false,
            run: Box::new(run),
        }
    }

    fn local_only(mut self) -> Self {
        self.skip_in_ci = true;
        self
    }

    pub(crate) fn run(&self, runner: &mut Runner, verdict: &mut Verdict) -> Result<()> {
        (self.run)(runner, verdict)
    }
}

fn to_args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| (*s).to_string()).collect()
}

/// A tcpkali that listens on `port` and connects to itself.
fn loopback(port: u16) -> Vec<String> {
    vec![format!("-l{port}"), format!("127.1:{port}")]
}

/// Occurrences of writes/reads that carry a partial message: lengths below
/// 10 that are not a multiple of the message length.
fn split_messages(hist: &LengthHistogram) -> u64 {
    hist.count_where(|len| (1..10).contains(&len) && len % MSG_LEN != 0)
}

/// Single self-connected instance with per-event capture.
fn shaped(
    title: &str,
    extra: &'static [&'static str],
    assert: fn(&AnalysisResult, &mut Verdict),
) -> Case {
    Case::new(title, move |runner, verdict| {
        let mut args = loopback(runner.port()?);
        args.extend(to_args(extra));
        let mut t = runner.start(&args, true)?;
        let a = runner.analyze(&mut t, "tcpkali", verdict)?;
        assert(&a, verdict);
        Ok(())
    })
}

pub(crate) fn catalogue() -> Vec<Case> {
    let mut cases = vec![
        Case::new("Correctness of data packetization", |runner, verdict| {
            // 162222 = 1460 (tcpkali's segment constant) * 1000 (hz) / 9 (message length)
            let mut args = loopback(runner.port()?);
            args.extend(to_args(&["-T1", "-mFOOBARBAZ", "-r162222"]));
            let mut t = runner.start(&args, true)?;
            let out = t.results().context("collect tcpkali output")?;
            let report =
                check_segmentation(runner.analyzer.parser(), EventKind::Write, &out.stderr, "FOOBARBAZ");
            verdict.check(format!("written stream is whole messages: {report}"), report.is_consistent());
            Ok(())
        })
        .local_only(),
        shaped(
            "Slow rate limiting cuts packets at message boundaries",
            &["-T1", "-r20", "-mABC"],
            |a, v| {
                let p = a.output_length_percentile_lte(MSG_LEN);
                v.check(format!("100% of writes <= {MSG_LEN} bytes (got {p}%)"), p == 100);
            },
        ),
        shaped(
            "Rate limiting at 2k does not create single-message writes",
            &["-T1", "-r2k", "-mABC"],
            |a, v| {
                let p = a.output_length_percentile_lte(MSG_LEN);
                v.check(format!("<2% of writes <= {MSG_LEN} bytes (got {p}%)"), p < 2);
                assert_whole_messages(a, v);
            },
        ),
        shaped(
            "Rate limiting cuts packets at message boundaries",
            &["-T1", "-r3k", "-mABC"],
            |a, v| {
                let p = a.output_length_percentile_lte(4 * MSG_LEN);
                v.check(format!(">90% of writes <= {} bytes (got {p}%)", 4 * MSG_LEN), p > 90);
                assert_whole_messages(a, v);
            },
        ),
        shaped(
            "Write combining OFF still cuts packets at message boundaries",
            &["-T1", "-r3k", "-mABC", "--write-combine=off"],
            |a, v| {
                let p = a.output_length_percentile_lte(4 * MSG_LEN);
                v.check(format!(">90% of writes <= {} bytes (got {p}%)", 4 * MSG_LEN), p > 90);
                assert_whole_messages(a, v);
            },
        ),
        shaped(
            "Rate limiting smoothness with 2kRPS",
            &["-T1", "-r2k", "-mABC"],
            |a, v| {
                // Not too many long-write outliers.
                let p = a.output_length_percentile_lte(4 * MSG_LEN);
                v.check(format!(">95% of writes <= {} bytes (got {p}%)", 4 * MSG_LEN), p > 95);
            },
        ),
        shaped(
            "Rate limiting smoothness with 15kRPS",
            &["-T1", "-r15k", "-mABC"],
            |a, v| {
                // Not too many short-write outliers.
                let p = a.output_length_percentile_lte(2 * MSG_LEN);
                v.check(format!("<10% of writes <= {} bytes (got {p}%)", 2 * MSG_LEN), p < 10);
            },
        ),
        // A single worker keeps TCP-level coalescing observable on the read side.
        shaped(
            "Observe write combining at 20kRPS by default",
            &["-T1", "-w1", "-r20k", "-mABC", "--dump-all"],
            |a, v| {
                let p = a.output_length_percentile_lte(4 * MSG_LEN);
                v.check(format!("<10% of writes <= {} bytes (got {p}%)", 4 * MSG_LEN), p < 10);
                let p = a.input_length_percentile_lte(MSG_LEN);
                v.check(format!("<10% of reads <= {MSG_LEN} bytes (got {p}%)"), p < 10);
            },
        ),
        shaped(
            "No write combining at 20kRPS with --write-combine=off",
            &["-T1", "-w1", "-r20k", "-mABC", "--dump-all", "--write-combine=off"],
            |a, v| {
                let p = a.output_length_percentile_lte(MSG_LEN);
                v.check(format!("100% of writes <= {MSG_LEN} bytes (got {p}%)"), p == 100);
                // On one core at least some reads must still coalesce.
                let p = a.input_length_percentile_lte(MSG_LEN);
                v.check(format!("<50% of reads <= {MSG_LEN} bytes (got {p}%)"), p < 50);
            },
        ),
    ];

    for variant in VARIANTS {
        cases.extend(bandwidth_cases(variant));
    }
    cases
}

fn assert_whole_messages(a: &AnalysisResult, v: &mut Verdict) {
    let split = split_messages(&a.out_lengths);
    v.check(format!("no write splits a message (got {split})"), split == 0);
}

fn bandwidth_cases(variant: &'static [&'static str]) -> Vec<Case> {
    let opts = format!("{variant:?}");
    vec![
        Case::new(
            format!("Can do more than 100 Mbps if short-circuited, opts={opts}"),
            move |runner, verdict| {
                let mut args = to_args(variant);
                args.extend(loopback(runner.port()?));
                args.extend(to_args(&["-m1", "-T1", "--listen-mode=active"]));
                let mut t = runner.start(&args, false)?;
                let a = runner.analyze(&mut t, "tcpkali", verdict)?;
                verdict.check(
                    format!(
                        "down and up > 100 Mbps (got {:.3}, {:.3})",
                        a.bw_down_mbps, a.bw_up_mbps
                    ),
                    a.bw_down_mbps > 100.0 && a.bw_up_mbps > 100.0,
                );
                Ok(())
            },
        ),
        Case::new(
            format!("Can effectively limit upstream bandwidth from sender, opts={opts}"),
            move |runner, verdict| {
                let port = runner.port()?;
                let mut receiver_args = to_args(variant);
                receiver_args.extend([format!("-l{port}"), "-T3".to_string()]);
                let mut sender_args = to_args(variant);
                sender_args.extend([
                    format!("127.1:{port}"),
                    "-m1".to_string(),
                    "-T3".to_string(),
                    "--channel-bandwidth-upstream=100kbps".to_string(),
                ]);

                // Both peers must be up before either is awaited.
                let mut receiver = runner.start(&receiver_args, false)?;
                let mut sender = runner.start(&sender_args, false)?;
                let arcv = runner.analyze(&mut receiver, "receiver", verdict)?;
                let asnd = runner.analyze(&mut sender, "sender", verdict)?;

                verdict.check(
                    format!(
                        "receiver: up < 0.01 and 0.090 < down < 0.110 Mbps (got up {:.3}, down {:.3})",
                        arcv.bw_up_mbps, arcv.bw_down_mbps
                    ),
                    arcv.bw_up_mbps < 0.01 && arcv.bw_down_mbps > 0.090 && arcv.bw_down_mbps < 0.110,
                );
                verdict.check(
                    format!(
                        "sender: down < 0.01 and 0.090 < up < 0.110 Mbps (got down {:.3}, up {:.3})",
                        asnd.bw_down_mbps, asnd.bw_up_mbps
                    ),
                    asnd.bw_down_mbps < 0.01 && asnd.bw_up_mbps > 0.090 && asnd.bw_up_mbps < 0.110,
                );
                Ok(())
            },
        ),
        // The downstream limit is applied by the receiver, so the sender only
        // sees it once the feedback loop through the socket buffers settles.
        Case::new(
            format!("Can effectively limit downstream bandwidth from receiver, opts={opts}"),
            move |runner, verdict| {
                const SECS: u64 = 11;
                let port = runner.port()?;
                let mut receiver_args = to_args(variant);
                receiver_args.extend([
                    format!("-l{port}"),
                    format!("-T{SECS}"),
                    "--rcvbuf=5k".to_string(),
                    "--channel-bandwidth-downstream=100kbps".to_string(),
                ]);
                let mut sender_args = to_args(variant);
                sender_args.extend([
                    format!("127.1:{port}"),
                    "-m1".to_string(),
                    format!("-T{SECS}"),
                    "--sndbuf=5k".to_string(),
                ]);

                let mut receiver = runner.start(&receiver_args, false)?;
                let mut sender = runner.start(&sender_args, false)?;
                let arcv = runner.analyze(&mut receiver, "receiver", verdict)?;
                let asnd = runner.analyze(&mut sender, "sender", verdict)?;

                let band = ByteBand::new(expected_transfer(100, SECS));
                check_byte_total(
                    verdict,
                    "receiver",
                    &arcv,
                    arcv.total_sent_bytes,
                    arcv.total_received_bytes,
                    band,
                );
                check_byte_total(
                    verdict,
                    "sender",
                    &asnd,
                    asnd.total_received_bytes,
                    asnd.total_sent_bytes,
                    band.widen(runner.sender_tolerance),
                );
                Ok(())
            },
        ),
    ]
}

/// Bytes moved in `secs` by a channel capped at `kbps` kilobits (1024 bits)
/// per second.
fn expected_transfer(kbps: u64, secs: u64) -> u64 {
    kbps * 1024 / 8 * secs
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ByteBand {
    min: f64,
    max: f64,
}

impl ByteBand {
    fn new(expected: u64) -> Self {
        let expected = expected as f64;
        Self {
            min: BAND_MIN * expected,
            max: BAND_MAX * expected,
        }
    }

    /// Scales only the upper bound.
    fn widen(self, factor: f64) -> Self {
        Self {
            max: self.max * factor,
            ..self
        }
    }

    fn contains(&self, bytes: u64) -> bool {
        let bytes = bytes as f64;
        bytes > self.min && bytes < self.max
    }
}

/// The capped direction must land in `band` and the other one stay idle,
/// unless the host ignored the socket buffer sizes the scenario relies on.
fn check_byte_total(
    verdict: &mut Verdict,
    role: &str,
    a: &AnalysisResult,
    idle_bytes: u64,
    capped_bytes: u64,
    band: ByteBand,
) {
    let in_band = idle_bytes < 1000 && band.contains(capped_bytes);
    let relaxed = if a.sockopt_works {
        ""
    } else {
        " [relaxed: socket buffer options ignored]"
    };
    verdict.check(
        format!(
            "{role}: idle < 1000 bytes and {:.0} < capped < {:.0} (got idle {idle_bytes}, capped {capped_bytes}){relaxed}",
            band.min, band.max
        ),
        in_band || !a.sockopt_works,
    );
}
