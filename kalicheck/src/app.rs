use crate::cases::{Runner, catalogue};
use crate::cli::Cli;
use crate::exit_codes::ExitCode;
use crate::logging::init_logging;
use crate::report::{CaseReport, Tally, Verdict, print_summary, write_json};
use crate::tools::resolve_tcpkali;
use anyhow::Result;

fn selected(only: &[String], title: &str) -> bool {
    only.is_empty() || only.iter().any(|needle| title.contains(needle.as_str()))
}

pub fn run(cli: Cli) -> Result<ExitCode> {
    init_logging(&cli.log_level, cli.log_format)?;

    let cases = catalogue();
    if cli.list {
        for case in &cases {
            let note = if case.skip_in_ci { " (skipped in CI)" } else { "" };
            println!("{}{note}", case.title);
        }
        return Ok(ExitCode::Success);
    }

    let tcpkali = resolve_tcpkali(&cli.tcpkali)?;
    tracing::info!(tcpkali = %tcpkali.display(), tag_style = %cli.tag_style, "resolved generator");
    let mut runner = Runner::new(tcpkali, &cli)?;

    let mut reports = Vec::new();
    for case in cases.iter().filter(|c| selected(&cli.only, &c.title)) {
        if cli.ci && case.skip_in_ci {
            println!("\nSKIP: {} (continuous integration)", case.title);
            reports.push(CaseReport::skipped(&case.title));
            continue;
        }

        println!("\n== {} ==", case.title);
        let mut verdict = Verdict::default();
        let outcome = case.run(&mut runner, &mut verdict);
        if let Err(err) = &outcome {
            tracing::error!(case = %case.title, error = %format!("{err:#}"), "scenario aborted");
        }
        let report = CaseReport::finished(&case.title, verdict, outcome);
        println!("{}: {}", report.status, case.title);
        reports.push(report);
    }

    print_summary(&reports);
    if let Some(path) = &cli.report_json {
        write_json(path, &reports)?;
    }

    let tally = Tally::of(&reports);
    let code = ExitCode::from_outcomes(tally.failed, tally.errored);
    if code == ExitCode::Success {
        println!("\nOVERALL: PASS");
    } else {
        println!(
            "\nOVERALL: FAIL ({} failing scenario(s))",
            tally.failed + tally.errored
        );
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_matches_substrings() {
        assert!(selected(&[], "anything"));
        let only = vec!["Rate limiting".to_string(), "Mbps".to_string()];
        assert!(selected(&only, "Rate limiting smoothness with 2kRPS"));
        assert!(selected(&only, "Can do more than 100 Mbps if short-circuited, opts=[]"));
        assert!(!selected(&only, "Correctness of data packetization"));
    }
}
