#![cfg(unix)]

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use kalicheck_core::{AnalysisResult, Error, LaunchOptions, ProcessHandle, TagStyle};
use tempfile::TempDir;

const FAST: Duration = Duration::from_millis(30);

fn fast_opts() -> LaunchOptions {
    LaunchOptions {
        grace: FAST,
        ..LaunchOptions::default()
    }
}

/// Writes a shell script standing in for the generator. It is run through
/// `/bin/sh` rather than exec'd directly so a concurrently forking test
/// cannot trip over a still-open write handle (ETXTBSY).
fn fake_generator(dir: &TempDir, name: &str, body: &str) -> anyhow::Result<Vec<String>> {
    let path: PathBuf = dir.path().join(name);
    std::fs::write(&path, body).context("write fake generator")?;
    Ok(vec![path.display().to_string()])
}

fn is_alive(pid: u32) -> bool {
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[test]
fn collects_output_after_exit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let args = fake_generator(
        &dir,
        "gen.sh",
        r#"
echo 'Snd(1, 3): [ABC]' >&2
echo 'Snd(1, 6): [ABCABC]' >&2
echo 'Rcv(1, 3): [ABC]' >&2
sleep 0.2
echo 'Total data sent:     9 bytes (9 bytes)'
echo 'Total data received: 3 bytes (3 bytes)'
echo 'Aggregate bandwidth: 120.500↓, 130.250↑ Mbps'
"#,
    )?;

    let mut handle = ProcessHandle::start_with("/bin/sh", &args, true, &fast_opts())?;
    assert!(!handle.is_finished());
    assert!(handle.command_line().ends_with("--dump-one"));

    let output = handle.results()?.clone();
    assert!(handle.is_finished());
    assert!(output.status.success());
    assert_eq!(output.stdout.len(), 3);
    assert_eq!(output.stderr.len(), 3);

    let again = handle.results()?;
    assert_eq!(again.stdout, output.stdout);
    assert_eq!(again.stderr, output.stderr);

    let res = AnalysisResult::from_output(&output, TagStyle::SndRcv)?;
    assert_eq!(res.out_num, 2);
    assert_eq!(res.in_num, 1);
    assert_eq!(res.total_sent_bytes, 9);
    assert!(res.bw_down_mbps > 100.0 && res.bw_up_mbps > 100.0);
    Ok(())
}

#[test]
fn capture_flag_is_appended_last() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let mut args = fake_generator(&dir, "args.sh", "sleep 0.1\nfor a in \"$@\"; do echo \"$a\"; done\n")?;
    args.push("-mABC".to_string());

    let opts = LaunchOptions {
        grace: FAST,
        capture_flag: "--dump-all".to_string(),
    };
    let mut handle = ProcessHandle::start_with("/bin/sh", &args, true, &opts)?;
    let out = handle.results()?;
    assert_eq!(out.stdout, ["-mABC", "--dump-all"]);

    let mut plain = ProcessHandle::start_with("/bin/sh", &args, false, &fast_opts())?;
    assert_eq!(plain.results()?.stdout, ["-mABC"]);
    Ok(())
}

#[test]
fn immediate_exit_is_a_launch_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let args = fake_generator(&dir, "fail.sh", "echo 'bad option' >&2\nexit 3\n")?;

    let opts = LaunchOptions {
        grace: Duration::from_millis(300),
        ..LaunchOptions::default()
    };
    match ProcessHandle::start_with("/bin/sh", &args, false, &opts) {
        Err(Error::Launch { reason, .. }) => {
            assert!(reason.contains("bad option"), "reason: {reason}");
        }
        other => anyhow::bail!("expected launch error, got {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_binary_is_a_launch_error() {
    let res = ProcessHandle::start("/nonexistent/tcpkali", ["-T1"], false);
    assert!(matches!(res, Err(Error::Launch { .. })), "{res:?}");
}

#[test]
fn drop_kills_and_reaps_running_child() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let args = fake_generator(&dir, "hang.sh", "exec sleep 30\n")?;

    let handle = ProcessHandle::start_with("/bin/sh", &args, false, &fast_opts())?;
    let pid = handle.pid();
    assert!(is_alive(pid));

    let started = Instant::now();
    drop(handle);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!is_alive(pid), "pid {pid} outlived its handle");
    Ok(())
}

#[test]
fn terminated_child_keeps_partial_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let args = fake_generator(&dir, "partial.sh", "echo partial\nexec sleep 30\n")?;

    let mut handle = ProcessHandle::start_with("/bin/sh", &args, false, &fast_opts())?;
    std::thread::sleep(Duration::from_millis(100));
    handle.terminate()?;
    assert!(handle.is_finished());
    handle.terminate()?;

    let out = handle.results()?;
    assert_eq!(out.stdout, ["partial"]);
    assert!(!out.status.success());

    // Nothing printed a summary, so analysis has nothing to work with.
    assert!(matches!(
        AnalysisResult::from_output(out, TagStyle::SndRcv),
        Err(Error::MissingMetric(_))
    ));
    Ok(())
}
