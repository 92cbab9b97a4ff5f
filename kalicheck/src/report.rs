use anyhow::{Context, Result};
use kalicheck_core::AnalysisResult;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum CaseStatus {
    Pass,
    Fail,
    Error,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CheckRecord {
    pub(crate) what: String,
    pub(crate) passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NamedAnalysis {
    pub(crate) role: &'static str,
    #[serde(flatten)]
    pub(crate) result: AnalysisResult,
}

/// Assertions and analyses collected while one scenario runs.
#[derive(Debug, Default)]
pub(crate) struct Verdict {
    checks: Vec<CheckRecord>,
    analyses: Vec<NamedAnalysis>,
}

impl Verdict {
    pub(crate) fn check(&mut self, what: impl Into<String>, passed: bool) {
        let what = what.into();
        println!("  {} {what}", if passed { "ok    " } else { "FAILED" });
        self.checks.push(CheckRecord { what, passed });
    }

    pub(crate) fn record(&mut self, role: &'static str, result: &AnalysisResult) {
        self.analyses.push(NamedAnalysis {
            role,
            result: result.clone(),
        });
    }

    pub(crate) fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CaseReport {
    pub(crate) title: String,
    pub(crate) status: CaseStatus,
    pub(crate) checks: Vec<CheckRecord>,
    pub(crate) analyses: Vec<NamedAnalysis>,
    pub(crate) error: Option<String>,
}

impl CaseReport {
    pub(crate) fn finished(title: &str, verdict: Verdict, outcome: Result<()>) -> Self {
        let (status, error) = match outcome {
            Err(err) => (CaseStatus::Error, Some(format!("{err:#}"))),
            Ok(()) if verdict.passed() => (CaseStatus::Pass, None),
            Ok(()) => (CaseStatus::Fail, None),
        };
        Self {
            title: title.to_string(),
            status,
            checks: verdict.checks,
            analyses: verdict.analyses,
            error,
        }
    }

    pub(crate) fn skipped(title: &str) -> Self {
        Self {
            title: title.to_string(),
            status: CaseStatus::Skip,
            checks: Vec::new(),
            analyses: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Tally {
    pub(crate) passed: usize,
    pub(crate) failed: usize,
    pub(crate) errored: usize,
    pub(crate) skipped: usize,
}

impl Tally {
    pub(crate) fn of(reports: &[CaseReport]) -> Self {
        let mut tally = Self::default();
        for r in reports {
            match r.status {
                CaseStatus::Pass => tally.passed += 1,
                CaseStatus::Fail => tally.failed += 1,
                CaseStatus::Error => tally.errored += 1,
                CaseStatus::Skip => tally.skipped += 1,
            }
        }
        tally
    }
}

pub(crate) fn print_summary(reports: &[CaseReport]) {
    println!("\nstatus | scenario");
    println!("-------+---------------------------------------------------------------");
    for r in reports {
        println!("{:<6} | {}", r.status.to_string(), r.title);
    }

    let t = Tally::of(reports);
    println!(
        "\npassed={} failed={} errors={} skipped={}",
        t.passed, t.failed, t.errored, t.skipped
    );
}

pub(crate) fn write_json(path: &Path, reports: &[CaseReport]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create report {path:?}"))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, reports)
        .with_context(|| format!("write report {path:?}"))?;
    out.flush().with_context(|| format!("flush report {path:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_checks_and_errors() {
        let mut ok = Verdict::default();
        ok.check("a", true);
        assert_eq!(CaseReport::finished("t", ok, Ok(())).status, CaseStatus::Pass);

        let mut bad = Verdict::default();
        bad.check("a", true);
        bad.check("b", false);
        assert_eq!(CaseReport::finished("t", bad, Ok(())).status, CaseStatus::Fail);

        let err = CaseReport::finished("t", Verdict::default(), Err(anyhow::anyhow!("boom")));
        assert_eq!(err.status, CaseStatus::Error);
        assert_eq!(err.error.as_deref(), Some("boom"));
    }

    #[test]
    fn tally_counts_each_status() {
        let reports = vec![
            CaseReport::finished("a", Verdict::default(), Ok(())),
            CaseReport::skipped("b"),
            CaseReport::finished("c", Verdict::default(), Err(anyhow::anyhow!("x"))),
        ];
        assert_eq!(
            Tally::of(&reports),
            Tally {
                passed: 1,
                failed: 0,
                errored: 1,
                skipped: 1,
            }
        );
        assert_eq!(CaseStatus::Skip.to_string(), "SKIP");
    }

    #[test]
    fn json_report_is_written() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("report.json");
        write_json(&path, &[CaseReport::skipped("only")])?;

        let value: serde_json::Value = serde_json::from_reader(File::open(&path)?)?;
        assert_eq!(value[0]["title"], "only");
        assert_eq!(value[0]["status"], "skip");
        Ok(())
    }
}
