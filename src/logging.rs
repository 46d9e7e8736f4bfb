use std::path::Path;

use anyhow::Context;
use once_cell::sync::OnceCell;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives for the subscriber, e.g. `scm_update=debug`.
pub const LOG_FILTER_ENV: &str = "SCM_UPDATE_LOG";
const DEFAULT_FILTER: &str = "scm_update=info";
const LOG_FILE_PREFIX: &str = "scm-update.log";

// Dropping the guard stops the background writer, so it lives for the process.
static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Install the JSON subscriber on stderr, plus a daily rolling file sink when
/// `log_dir` is given. `log` records are bridged into `tracing`.
///
/// Fails if a global subscriber is already installed; callers that may run
/// twice (tests, embedded hosts) can ignore the error.
pub fn init(log_dir: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let stderr_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_timer(UtcTime::rfc_3339())
        .with_writer(std::io::stderr);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_ansi(false)
                    .with_writer(writer),
            )
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("install global tracing subscriber")?;
    tracing_log::LogTracer::init().context("bridge log records into tracing")?;

    Ok(())
}
