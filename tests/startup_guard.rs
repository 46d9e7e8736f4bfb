mod util;

use std::fs;

use scm_update_lib::catalog::RepositoryMetadata;
use scm_update_lib::migration_guard::{format_guard_failure, run_startup_migrations};
use scm_update_lib::{
    JsonFileVersionLedger, MigrationStep, UpdateConfig, UpdateError, Version, VersionLedger,
};
use tempfile::tempdir;
use util::{entries, journal, RecordingStep};

fn seed_repositories(config: &UpdateConfig) -> anyhow::Result<()> {
    RepositoryMetadata::new("r2", "hitchhiker", "heart-of-gold")
        .write(&config.repository_dir("r2"))?;
    RepositoryMetadata::new("r1", "hitchhiker", "puzzle-42").write(&config.repository_dir("r1"))?;
    RepositoryMetadata::new("r3", "spaceship", "damn").write(&config.repository_dir("r3"))?;
    Ok(())
}

#[test]
fn startup_pass_uses_file_ledger_and_repository_directory() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path().join("home"));
    seed_repositories(&config)?;

    let journal = journal();
    let steps = vec![
        MigrationStep::global(RecordingStep::new("sonia.scm.config", "2.0.0", &journal).core()),
        MigrationStep::namespace(RecordingStep::new("sonia.scm.namespace", "2.0.0", &journal)),
        MigrationStep::repository(RecordingStep::new("sonia.scm.acl", "2.0.0", &journal)),
    ];

    let summary = run_startup_migrations(&config, steps)?;

    assert_eq!(summary.executed_count(), 3);
    assert_eq!(
        entries(&journal),
        vec![
            "sonia.scm.config:2.0.0",
            "sonia.scm.namespace:2.0.0/hitchhiker",
            "sonia.scm.namespace:2.0.0/spaceship",
            "sonia.scm.acl:2.0.0-r1",
            "sonia.scm.acl:2.0.0-r2",
            "sonia.scm.acl:2.0.0-r3",
        ]
    );

    let ledger = JsonFileVersionLedger::open(config.ledger_path())?;
    assert_eq!(ledger.get("sonia.scm.acl")?, Some(Version::new(2, 0, 0)));
    assert_eq!(ledger.entries().len(), 3);
    Ok(())
}

#[test]
fn next_boot_only_runs_what_never_completed() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    seed_repositories(&config)?;

    let first_boot = journal();
    let err = run_startup_migrations(
        &config,
        vec![
            MigrationStep::global(RecordingStep::new("a", "1.0.0", &first_boot)),
            MigrationStep::repository(
                RecordingStep::new("b", "2.0.0", &first_boot).failing_on("r2"),
            ),
            MigrationStep::global(RecordingStep::new("c", "3.0.0", &first_boot)),
        ],
    )
    .expect_err("startup is blocked");

    assert_eq!(err.code(), UpdateError::STEP_FAILED);
    let message = format_guard_failure(&err);
    assert!(message.contains("type b"));
    assert!(message.contains("version 2.0.0"));
    assert!(message.contains("repository id r2"));
    assert!(message.contains("b failed for r2"));

    let second_boot = journal();
    run_startup_migrations(
        &config,
        vec![
            MigrationStep::global(RecordingStep::new("a", "1.0.0", &second_boot)),
            MigrationStep::repository(RecordingStep::new("b", "2.0.0", &second_boot)),
            MigrationStep::global(RecordingStep::new("c", "3.0.0", &second_boot)),
        ],
    )?;

    assert_eq!(
        entries(&second_boot),
        vec!["b:2.0.0-r1", "b:2.0.0-r2", "b:2.0.0-r3", "c:3.0.0"]
    );
    Ok(())
}

#[test]
fn corrupt_ledger_blocks_startup() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    config.ensure_layout()?;
    fs::write(config.ledger_path(), "not json")?;

    let journal = journal();
    let err = run_startup_migrations(
        &config,
        vec![MigrationStep::global(RecordingStep::new("a", "1.0.0", &journal))],
    )
    .expect_err("ledger unreadable");

    assert_eq!(err.code(), UpdateError::LEDGER_FAILED);
    assert_eq!(err.cause().map(|c| c.code()), Some("LEDGER/READ"));
    assert!(entries(&journal).is_empty());
    Ok(())
}
