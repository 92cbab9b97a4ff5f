pub type Result<T> = std::result::Result<T, Error>;

/// Aggregate summary lines every normally completed run prints exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Metric {
    AggregateBandwidth,
    TotalSent,
    TotalReceived,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to launch `{command}`: {reason}")]
    Launch { command: String, reason: String },

    #[error("could not confirm exit of pid {pid}: {source}")]
    Reap {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("missing `{0}` line in generator output")]
    MissingMetric(Metric),

    #[error("`{0}` line printed more than once in generator output")]
    DuplicateMetric(Metric),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid event grammar: {0}")]
    Grammar(#[from] regex::Error),
}
