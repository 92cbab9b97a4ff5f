#![cfg(unix)]

use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

/// Writes an executable stand-in for tcpkali that dumps `write` on every
/// per-write line and then prints a plausible summary.
fn write_fake(dir: &Path, name: &str, write: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\n\
         sleep 0.3\n\
         i=0\n\
         while [ $i -lt 20 ]; do echo 'Snd(1, {len}): [{write}]' >&2; i=$((i+1)); done\n\
         echo 'Total data sent:     60 bytes (60 bytes)'\n\
         echo 'Total data received: 60 bytes (60 bytes)'\n\
         echo 'Aggregate bandwidth: 0.001↓, 0.001↑ Mbps'\n",
        len = write.len(),
    );
    std::fs::write(&path, script).context("write fake tcpkali")?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .context("chmod fake tcpkali")?;
    Ok(path)
}

fn run_slow_rate_case(tcpkali: &Path, report: &Path) -> anyhow::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_kalicheck"))
        .arg("--tcpkali")
        .arg(tcpkali)
        .arg("--launch-grace")
        .arg("20ms")
        .arg("--only")
        .arg("Slow rate limiting")
        .arg("--report-json")
        .arg(report)
        .env_remove("RUST_LOG")
        .output()
        .context("run kalicheck binary")
}

// Both scripts are written before anything is spawned so no fork can inherit
// an open write handle to them.
#[test]
fn verdict_follows_generator_output() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let good = write_fake(dir.path(), "tcpkali-good", "ABC")?;
    let bad = write_fake(dir.path(), "tcpkali-bad", "ABCABC")?;

    let report = dir.path().join("good.json");
    let out = run_slow_rate_case(&good, &report)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        status_code(out.status) == 0,
        "expected exit code 0, got {}\nstdout:\n{stdout}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stderr)
    );
    anyhow::ensure!(stdout.contains("PASS: Slow rate limiting"), "stdout:\n{stdout}");
    anyhow::ensure!(stdout.contains("OVERALL: PASS"), "stdout:\n{stdout}");

    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report).context("read report")?)?;
    anyhow::ensure!(value[0]["status"] == "pass", "report: {value}");
    anyhow::ensure!(value[0]["analyses"][0]["out_num"] == 20, "report: {value}");

    let report = dir.path().join("bad.json");
    let out = run_slow_rate_case(&bad, &report)?;
    let stdout = String::from_utf8_lossy(&out.stdout);
    anyhow::ensure!(
        status_code(out.status) == 10,
        "expected exit code 10, got {}\nstdout:\n{stdout}",
        status_code(out.status)
    );
    anyhow::ensure!(stdout.contains("FAIL: Slow rate limiting"), "stdout:\n{stdout}");
    Ok(())
}
