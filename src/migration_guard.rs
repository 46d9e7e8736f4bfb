use std::process;

use tracing::{error, info};

use crate::catalog::DirectoryCatalog;
use crate::config::UpdateConfig;
use crate::engine::{run_pending_migrations, UpdateSummary};
use crate::ledger::JsonFileVersionLedger;
use crate::step::MigrationStep;
use crate::{UpdateError, UpdateResult};

/// Exit status of a host whose startup was stopped by a failed update pass.
pub const UPDATE_FAILED_EXIT_CODE: i32 = 3;
pub const USER_RECOVERY_MESSAGE: &str =
    "Fix the reported problem and restart the server. Steps that already completed will not run again.";

/// Operator message for a failed pass.
pub fn format_guard_failure(error: &UpdateError) -> String {
    let root = error.root_cause();
    if std::ptr::eq(root, error) {
        format!("Data migration failed: {}. Server startup stopped.", error.message())
    } else {
        format!(
            "Data migration failed: {}: {}. Server startup stopped.",
            error.message(),
            root.message()
        )
    }
}

/// Runs every outstanding step against the ledger and repository directory
/// of `config`. Must complete before any other part of the server starts.
pub fn run_startup_migrations(
    config: &UpdateConfig,
    steps: Vec<MigrationStep>,
) -> UpdateResult<UpdateSummary> {
    let result = config
        .ensure_layout()
        .and_then(|_| {
            JsonFileVersionLedger::open(config.ledger_path()).map_err(|err| {
                UpdateError::new(UpdateError::LEDGER_FAILED, "could not open the version ledger")
                    .with_context("path", config.ledger_path().display().to_string())
                    .with_cause(err)
            })
        })
        .and_then(|mut ledger| {
            let catalog = DirectoryCatalog::new(config);
            run_pending_migrations(steps, &mut ledger, &catalog, &catalog)
        });

    match result {
        Ok(summary) => {
            info!(
                target: "scm_update",
                event = "update_guard_passed",
                executed = summary.executed_count(),
                skipped = summary.skipped
            );
            Ok(summary)
        }
        Err(err) => {
            error!(
                target: "scm_update",
                event = "update_guard_blocked",
                code = %err.code(),
                data_type = err.context_value("data_type").unwrap_or(""),
                target_version = err.context_value("target_version").unwrap_or(""),
                message = %format_guard_failure(&err)
            );
            Err(err)
        }
    }
}

/// Like [`run_startup_migrations`], but exits the process with
/// [`UPDATE_FAILED_EXIT_CODE`] on failure.
pub fn enforce_startup_migrations(config: &UpdateConfig, steps: Vec<MigrationStep>) -> UpdateSummary {
    match run_startup_migrations(config, steps) {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("{}", format_guard_failure(&err));
            eprintln!("{USER_RECOVERY_MESSAGE}");
            process::exit(UPDATE_FAILED_EXIT_CODE);
        }
    }
}
