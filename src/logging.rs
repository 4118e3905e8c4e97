//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log filter:
//! 1. `--log-level` CLI flag
//! 2. `--verbose` (debug)
//! 3. `GANTT_LOG` environment variable, any `EnvFilter` directive
//!    (e.g. "info", "gantt_graph=trace")
//! 4. `log.level` from the config file
//! 5. default to `warn`
//!
//! Logs are sent to STDERR so that stdout carries only command output.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable holding a log filter
pub const LOG_ENV: &str = "GANTT_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Initialise the global logging subscriber.
///
/// Call once at startup.
pub fn init_logging(
    cli_level: Option<LogLevel>,
    verbose: bool,
    config_level: Option<&str>,
) -> Result<()> {
    let directive = select_directive(cli_level, verbose, std::env::var(LOG_ENV).ok(), config_level);
    let filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("Invalid log filter: {directive}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {e}"))?;

    Ok(())
}

fn select_directive(
    cli_level: Option<LogLevel>,
    verbose: bool,
    env: Option<String>,
    config_level: Option<&str>,
) -> String {
    if let Some(level) = cli_level {
        return level.as_str().to_string();
    }
    if verbose {
        return LogLevel::Debug.as_str().to_string();
    }

    env.filter(|s| !s.trim().is_empty())
        .or_else(|| config_level.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}
