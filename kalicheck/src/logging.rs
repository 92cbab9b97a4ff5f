//! Diagnostic log sink.
//!
//! Everything goes to stderr so stdout stays reserved for PASS/FAIL lines.
//! `RUST_LOG` takes precedence over `--log-level`.

use crate::cli::LogFormat;
use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

pub(crate) fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
    }
    .map_err(|err| anyhow!("install log subscriber: {err}"))?;

    tracing::debug!(log_level = level, ?format, "logging initialized");
    Ok(())
}
