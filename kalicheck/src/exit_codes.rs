#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// One or more scenarios failed their checks.
    ScenariosFailed = 10,

    /// A scenario could not run to completion (launch, reap or missing summary).
    ScenarioError = 20,

    /// Invalid CLI/config (bad flags, unknown tag style, etc.).
    InvalidInput = 30,

    /// Environment problem (tcpkali not found, report not writable, logging setup).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_outcomes(failed: usize, errored: usize) -> Self {
        match (failed, errored) {
            (0, 0) => Self::Success,
            (_, 0) => Self::ScenariosFailed,
            _ => Self::ScenarioError,
        }
    }
}
