mod util;

use std::fs;

use scm_update_lib::{
    JsonFileVersionLedger, MigrationStep, StaticCatalog, UpdateEngine, Version, VersionLedger,
};
use tempfile::tempdir;
use util::{entries, journal, RecordingStep};

#[test]
fn pass_survives_reopening_the_ledger() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("update-steps.json");
    let catalog = StaticCatalog::new(["space"], ["42"]);

    let journal = journal();
    let engine = UpdateEngine::new(vec![
        MigrationStep::global(RecordingStep::new("sonia.scm.user.xml", "2.0.0", &journal)),
        MigrationStep::repository(RecordingStep::new("sonia.scm.acl", "2.0.1", &journal)),
    ]);

    {
        let mut ledger = JsonFileVersionLedger::open(&path)?;
        engine.run_pending_migrations(&mut ledger, &catalog, &catalog)?;
    }

    let mut reopened = JsonFileVersionLedger::open(&path)?;
    assert_eq!(
        reopened.get("sonia.scm.acl")?,
        Some(Version::new(2, 0, 1))
    );
    let summary = engine.run_pending_migrations(&mut reopened, &catalog, &catalog)?;
    assert_eq!(summary.executed_count(), 0);
    assert_eq!(entries(&journal).len(), 2);

    let raw: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
    assert_eq!(raw["entries"]["sonia.scm.user.xml"]["version"], "2.0.0");
    Ok(())
}

#[test]
fn unparseable_recorded_version_reruns_the_step() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("update-steps.json");
    fs::write(
        &path,
        r#"{"entries":{"sonia.scm.acl":{"version":"two","applied_at":0}}}"#,
    )?;
    let catalog = StaticCatalog::default();

    let journal = journal();
    let engine = UpdateEngine::new(vec![MigrationStep::global(RecordingStep::new(
        "sonia.scm.acl",
        "2.0.0",
        &journal,
    ))]);
    let mut ledger = JsonFileVersionLedger::open(&path)?;
    engine.run_pending_migrations(&mut ledger, &catalog, &catalog)?;

    assert_eq!(entries(&journal), vec!["sonia.scm.acl:2.0.0"]);
    assert_eq!(ledger.entries()["sonia.scm.acl"].version, "2.0.0");
    Ok(())
}
