//! Lifecycle of a single traffic generator child process.
//!
//! The child's stdout and stderr are redirected into anonymous temporary
//! files rather than pipes, so a chatty child (per-event dumps can run into
//! hundreds of megabytes) never stalls on a full pipe while nobody reads it.
//! The files are read back once the child has been reaped.

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Flag asking the generator to dump the payload of every write/read.
pub const DEFAULT_CAPTURE_FLAG: &str = "--dump-one";

/// How long a freshly spawned child must stay alive to count as launched.
pub const DEFAULT_LAUNCH_GRACE: Duration = Duration::from_millis(100);

const LAUNCH_DIAG_LINES: usize = 12;
const LAUNCH_DIAG_CHARS: usize = 1200;

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub grace: Duration,
    pub capture_flag: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            grace: DEFAULT_LAUNCH_GRACE,
            capture_flag: DEFAULT_CAPTURE_FLAG.to_string(),
        }
    }
}

/// Everything a finished child left behind.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
    pub status: ExitStatus,
}

#[derive(Debug)]
enum State {
    Running(Child),
    Exited(ExitStatus),
}

/// Owns one generator process from spawn to reap.
///
/// Dropping a handle whose child is still running kills the child and waits
/// for it, so a live generator never outlives its handle.
#[derive(Debug)]
pub struct ProcessHandle {
    command_line: String,
    pid: u32,
    state: State,
    stdout: File,
    stderr: File,
    output: Option<CapturedOutput>,
}

impl ProcessHandle {
    pub fn start<I, S>(exe: impl AsRef<Path>, args: I, capture_io: bool) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self::start_with(exe, args, capture_io, &LaunchOptions::default())
    }

    pub fn start_with<I, S>(
        exe: impl AsRef<Path>,
        args: I,
        capture_io: bool,
        opts: &LaunchOptions,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(exe.as_ref());
        cmd.args(args);
        if capture_io {
            cmd.arg(&opts.capture_flag);
        }
        let command_line = command_to_string(&cmd);

        let stdout = tempfile::tempfile()?;
        let stderr = tempfile::tempfile()?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(stdout.try_clone()?))
            .stderr(Stdio::from(stderr.try_clone()?));

        info!(command = %command_line, "launching generator");
        let mut child = cmd.spawn().map_err(|err| Error::Launch {
            command: command_line.clone(),
            reason: err.to_string(),
        })?;
        let pid = child.id();

        thread::sleep(opts.grace);

        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                let mut stderr = stderr;
                let tail = read_lines(&mut stderr)
                    .map(|lines| truncate(&tail_lines(&lines, LAUNCH_DIAG_LINES), LAUNCH_DIAG_CHARS))
                    .unwrap_or_default();
                warn!(pid, %status, "generator exited during startup");
                return Err(Error::Launch {
                    command: command_line,
                    reason: format!("exited within {:?} ({status})\n{tail}", opts.grace),
                });
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Reap { pid, source });
            }
        }

        info!(pid, "started generator");

        Ok(Self {
            command_line,
            pid,
            state: State::Running(child),
            stdout,
            stderr,
            output: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Exited(_))
    }

    /// Blocks until the child exits and returns its captured output.
    ///
    /// The first successful call caches the output; later calls return the
    /// cached lines without touching the process again.
    pub fn results(&mut self) -> Result<&CapturedOutput> {
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let status = self.wait()?;
                CapturedOutput {
                    stdout: read_lines(&mut self.stdout)?,
                    stderr: read_lines(&mut self.stderr)?,
                    status,
                }
            }
        };
        Ok(self.output.insert(output))
    }

    /// Kills a still running child and reaps it. No-op once the child exited.
    pub fn terminate(&mut self) -> Result<()> {
        if let State::Running(child) = &mut self.state {
            warn!(pid = self.pid, "terminating generator");
            if let Err(err) = child.kill() {
                // Already exited on its own; the wait below still reaps it.
                debug!(pid = self.pid, error = %err, "kill failed");
            }
            self.wait()?;
        }
        Ok(())
    }

    fn wait(&mut self) -> Result<ExitStatus> {
        match &mut self.state {
            State::Exited(status) => Ok(*status),
            State::Running(child) => {
                let status = child.wait().map_err(|source| Error::Reap {
                    pid: self.pid,
                    source,
                })?;
                info!(pid = self.pid, %status, "stopped generator");
                self.state = State::Exited(status);
                Ok(status)
            }
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Err(err) = self.terminate() {
            error!(pid = self.pid, error = %err, "could not stop abandoned generator");
        }
    }
}

fn read_lines(file: &mut File) -> Result<Vec<String>> {
    file.seek(SeekFrom::Start(0))?;
    let mut raw = Vec::new();
    file.read_to_end(&mut raw)?;
    Ok(String::from_utf8_lossy(&raw)
        .lines()
        .map(str::to_owned)
        .collect())
}

fn command_to_string(cmd: &Command) -> String {
    let prog = cmd.get_program().to_string_lossy();
    let mut out = String::new();
    out.push_str(&quote_for_display(&prog));
    for arg in cmd.get_args() {
        out.push(' ');
        out.push_str(&quote_for_display(&arg.to_string_lossy()));
    }
    out
}

fn quote_for_display(s: &str) -> String {
    // Only for the logged command line and launch errors; tcpkali arguments
    // like `-m "hello world"` must stay readable as one argument.
    let needs_quotes = s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\\' | '\''));
    if !needs_quotes {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn tail_lines(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }

    let mut out = String::with_capacity(max_chars + 3);
    out.extend(s.chars().take(max_chars));
    out.push_str("...");
    out
}
