use std::fs;

use scm_update_lib::catalog::RepositoryMetadata;
use scm_update_lib::store::{
    BlobDirectoryAccess, PropertyFileAccess, StoreOwner, StoreRelocation, StoreType,
};
use scm_update_lib::{
    DirectoryCatalog, GlobalUpdateStep, InMemoryVersionLedger, MigrationStep, UpdateConfig,
    UpdateStepTarget, Version,
};
use tempfile::tempdir;

#[test]
fn renames_repository_data_store() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    let old = config.repository_dir("42").join("store/data/acl");
    fs::create_dir_all(&old)?;
    fs::write(old.join("entry.json"), "{}")?;

    let updater = StoreRelocation::new(&config)
        .for_type(StoreType::Data)
        .for_name("acl")
        .for_repository("42")
        .build()?;
    assert_eq!(updater.owner(), &StoreOwner::Repository("42".into()));
    updater.rename_store("permissions")?;

    assert!(!old.exists());
    assert!(config
        .repository_dir("42")
        .join("store/data/permissions/entry.json")
        .is_file());
    Ok(())
}

#[test]
fn rename_onto_existing_store_fails_and_keeps_both() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    let blob_root = config.var_dir().join("namespaces/hitchhiker/blob");
    fs::create_dir_all(blob_root.join("old"))?;
    fs::create_dir_all(blob_root.join("new"))?;

    let err = StoreRelocation::new(&config)
        .for_type(StoreType::Blob)
        .for_name("old")
        .for_namespace("hitchhiker")
        .build()?
        .rename_store("new")
        .expect_err("target exists");

    assert_eq!(err.code(), "STORE/TARGET_EXISTS");
    assert!(blob_root.join("old").is_dir());
    assert!(blob_root.join("new").is_dir());
    Ok(())
}

#[test]
fn deletes_global_config_store() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    fs::create_dir_all(config.config_dir())?;
    fs::write(config.config_dir().join("obsolete.json"), "{}")?;

    let updater = StoreRelocation::new(&config)
        .for_type(StoreType::Config)
        .for_name("obsolete")
        .build()?;
    assert!(updater.delete_store()?);
    assert!(!config.config_dir().join("obsolete.json").exists());
    assert!(!updater.delete_store()?);
    Ok(())
}

#[test]
fn rejects_store_names_that_escape_the_layout() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    let err = StoreRelocation::new(&config)
        .for_type(StoreType::Data)
        .for_name("../config")
        .build()
        .expect_err("invalid name");
    assert_eq!(err.code(), "STORE/INVALID_NAME");
    Ok(())
}

/// Moves the global `acl` data store and blob directories into per-repository
/// stores, then backs up the legacy file, as a core upgrade step would.
struct SplitGlobalStores {
    config: UpdateConfig,
}

impl UpdateStepTarget for SplitGlobalStores {
    fn target_version(&self) -> Version {
        Version::new(2, 0, 0)
    }

    fn affected_data_type(&self) -> &str {
        "sonia.scm.store.layout"
    }
}

impl GlobalUpdateStep for SplitGlobalStores {
    fn do_update(&self) -> anyhow::Result<()> {
        let files = PropertyFileAccess::new(&self.config);
        let acl = files.for_store_name("acl");
        if acl.has_store_directory() {
            acl.for_store_files(|path, repository_id| {
                acl.move_as_repository_store(path, repository_id).map(|_| ())
            })?;
        }

        let blobs = BlobDirectoryAccess::new(&self.config);
        blobs.for_blob_directories(|blob| {
            let repository_id = blob
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default()
                .to_string();
            blobs
                .move_to_repository_blob_store(blob, "attachments", &repository_id)
                .map(|_| ())
        })?;

        files.backup_legacy_file("repositories.xml")?;
        Ok(())
    }
}

#[test]
fn relocation_primitives_inside_a_pass() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = UpdateConfig::new(dir.path());
    config.ensure_layout()?;
    for id in ["r1", "r2"] {
        RepositoryMetadata::new(id, "space", id).write(&config.repository_dir(id))?;
        let data = config.var_dir().join("data/acl");
        fs::create_dir_all(&data)?;
        fs::write(data.join(format!("{id}.json")), "{}")?;
        let blob = config.var_dir().join("blob").join(id);
        fs::create_dir_all(&blob)?;
        fs::write(blob.join("file.bin"), id)?;
    }
    fs::write(config.config_dir().join("repositories.xml"), "<repositories/>")?;

    let engine = scm_update_lib::UpdateEngine::new(vec![MigrationStep::global(SplitGlobalStores {
        config: config.clone(),
    })]);
    let catalog = DirectoryCatalog::new(&config);
    let summary =
        engine.run_pending_migrations(&mut InMemoryVersionLedger::new(), &catalog, &catalog)?;
    assert_eq!(summary.executed_count(), 1);

    for id in ["r1", "r2"] {
        let store = config.repository_dir(id).join("store");
        assert!(store.join(format!("data/acl/{id}.json")).is_file());
        assert_eq!(
            fs::read_to_string(store.join("blob/attachments/file.bin"))?,
            id
        );
    }
    assert!(config
        .config_dir()
        .join("repositories.xml.v1.backup")
        .is_file());
    assert!(!config.config_dir().join("repositories.xml").exists());
    Ok(())
}
